#[cfg(test)]
mod tests {
    use crate::*;

    fn id(entity_type: u32, sequence: u32) -> EntityId {
        EntityId::new(EntityType(entity_type), sequence)
    }

    #[test]
    fn test_entity_id_packing() -> Result<()> {
        let entity_id = id(7, 42);
        assert_eq!(entity_id.extract_type(), EntityType(7));
        assert_eq!(entity_id.extract_sequence(), 42);
        assert!(id(7, 1) < id(7, 2));
        Ok(())
    }

    #[test]
    fn test_get_by_local_and_remote_id() -> Result<()> {
        let mut cache = IdentityCache::new();
        let alice = id(1, 1);
        cache.insert(alice, Some(&Value::from("alice")));

        assert_eq!(cache.get(&CacheKey::local(alice)), Some(alice));
        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), "alice")), Some(alice));
        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), "bob")), None);
        assert_eq!(cache.get(&CacheKey::local(id(1, 2))), None);
        Ok(())
    }

    #[test]
    fn test_remote_insert_rekeys() -> Result<()> {
        let mut cache = IdentityCache::new();
        let entity = id(1, 1);
        cache.insert(entity, Some(&Value::from("a")));

        cache.remote_insert(entity, Some(&Value::from("b")), Some(&Value::from("a")));

        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), "a")), None);
        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), "b")), Some(entity));
        assert!(cache.contains(entity));
        Ok(())
    }

    #[test]
    fn test_remote_insert_keeps_foreign_key() -> Result<()> {
        let mut cache = IdentityCache::new();
        let first = id(1, 1);
        let second = id(1, 2);
        cache.insert(first, Some(&Value::from("a")));
        cache.insert(second, None);

        // "a" belongs to another entity and must stay
        cache.remote_insert(second, Some(&Value::from("b")), Some(&Value::from("a")));

        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), "a")), Some(first));
        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), "b")), Some(second));
        Ok(())
    }

    #[test]
    fn test_partitions_do_not_collide() -> Result<()> {
        let mut cache = IdentityCache::new();
        let person = id(1, 1);
        let dog = id(2, 2);
        cache.insert(person, Some(&Value::Int(5)));
        cache.insert(dog, Some(&Value::Int(5)));

        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), 5)), Some(person));
        assert_eq!(cache.get(&CacheKey::remote(EntityType(2), 5)), Some(dog));
        Ok(())
    }

    #[test]
    fn test_remove_evicts_both_keys() -> Result<()> {
        let mut cache = IdentityCache::new();
        let entity = id(1, 1);
        cache.insert(entity, Some(&Value::from("x")));

        cache.remove(entity, Some(&Value::from("x")));

        assert!(!cache.contains(entity));
        assert_eq!(cache.get(&CacheKey::remote(EntityType(1), "x")), None);
        assert_eq!(cache.len(EntityType(1)), 0);
        Ok(())
    }

    #[test]
    fn test_entities_in_creation_order() -> Result<()> {
        let mut cache = IdentityCache::new();
        for sequence in [3, 1, 2] {
            cache.insert(id(1, sequence), None);
        }
        cache.insert(id(1, 1), None);

        let entities: Vec<EntityId> = cache.entities(EntityType(1)).collect();
        assert_eq!(entities, vec![id(1, 1), id(1, 2), id(1, 3)]);
        assert_eq!(cache.entities(EntityType(9)).count(), 0);
        Ok(())
    }
}
