use classbind::pool::UnitPool;

#[test]
fn version_is_exposed() {
    assert!(!classbind::version().is_empty());
}

#[test]
fn a_fresh_pool_is_empty() {
    let pool = UnitPool::new();
    assert!(pool.is_empty());
    assert_eq!(pool.len(), 0);
    assert!(!pool.contains("com.acme.Person"));
    assert!(pool.get("com.acme.Person").is_none());
}
