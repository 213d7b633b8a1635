use super::*;
use uuid::Uuid;

#[test]
fn normalize_trims_whitespace() {
    assert_eq!(normalize_name("  Ada  "), "Ada");
}

#[test]
fn normalize_blank_becomes_anonymous() {
    assert_eq!(normalize_name(""), ANONYMOUS);
    assert_eq!(normalize_name("   \t"), ANONYMOUS);
}

#[test]
fn normalize_truncates_overlong_name() {
    let long = "x".repeat(MAX_NAME_CHARS + 10);
    assert_eq!(normalize_name(&long), "x".repeat(MAX_NAME_CHARS));
    assert_eq!(normalize_name(&"é".repeat(MAX_NAME_CHARS + 1)).chars().count(), MAX_NAME_CHARS);
}

#[test]
fn same_identity_is_exact_match() {
    assert!(is_same_identity("Ada", "Ada"));
    assert!(!is_same_identity("Ada", "ada"));
}

#[test]
fn collisions_find_other_sessions_with_same_name() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let seats = [(a, "Ada"), (b, "Grace"), (c, "Ada")];

    assert_eq!(collisions(seats, "Ada", None), vec![a, c]);
    assert_eq!(collisions(seats, "Ada", Some(c)), vec![a]);
    assert!(collisions(seats, "Linus", None).is_empty());
}
