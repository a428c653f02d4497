#[cfg(test)]
mod tests {
    use crate::*;

    fn zoo() -> Result<(Store, EntityType, EntityType, EntityType)> {
        let mut store = Store::new();
        store.install_namespace(
            "default",
            vec![
                SchemaDef::new("Keeper").attribute("name"),
                SchemaDef::new("Animal")
                    .attribute("name")
                    .attribute_with_default("legs", 4)
                    .relationship(RelationshipDef::new("keeper", "Keeper").reverse("animals"))
                    .method("describe", |store, id, _| {
                        let name = store.read(id, "name")?;
                        Ok(sstr!(format!("animal {}", name.as_string().unwrap_or("?"))))
                    }),
                SchemaDef::new("Bird")
                    .parent("Animal")
                    .attribute("wingspan")
                    .attribute_with_default("legs", 2),
            ],
        )?;
        let keeper = store.schema_by_name("Keeper")?;
        let animal = store.schema_by_name("Animal")?;
        let bird = store.schema_by_name("Bird")?;
        Ok((store, keeper, animal, bird))
    }

    #[test]
    fn test_child_inherits_members() -> Result<()> {
        let (mut store, _, animal, bird) = zoo()?;

        let schema = store.schema(bird)?;
        assert_eq!(schema.parent, Some(animal));
        assert!(schema.attribute_slot("name").is_some());
        assert!(schema.attribute_slot("wingspan").is_some());
        assert!(schema.relation("keeper").is_some());
        assert!(schema.has_method("describe"));
        assert_eq!(store.schema(animal)?.children, vec![bird]);

        let tweety = store.instantiate(bird, record! { "name" => "tweety" })?;
        assert_eq!(store.read(tweety, "legs")?, sint!(2));
        assert_eq!(store.call(tweety, "describe", &[])?, sstr!("animal tweety"));

        let cat = store.instantiate(animal, record! {})?;
        assert_eq!(store.read(cat, "legs")?, sint!(4));
        assert!(store.schema(animal)?.attribute_slot("wingspan").is_none());
        Ok(())
    }

    #[test]
    fn test_is_a_follows_parents() -> Result<()> {
        let (store, keeper, animal, bird) = zoo()?;
        assert!(store.is_a(bird, animal));
        assert!(store.is_a(bird, bird));
        assert!(!store.is_a(animal, bird));
        assert!(!store.is_a(bird, keeper));
        assert_eq!(store.descendants(animal), vec![animal, bird]);
        Ok(())
    }

    #[test]
    fn test_parent_lookups_include_children() -> Result<()> {
        let (mut store, _, animal, bird) = zoo()?;
        let cat = store.instantiate(animal, record! { "id" => "cat", "name" => "cat" })?;
        let tweety = store.instantiate(bird, record! { "id" => "tweety", "name" => "tweety" })?;

        assert_eq!(store.all(animal)?, vec![cat, tweety]);
        assert_eq!(store.all(bird)?, vec![tweety]);
        assert_eq!(store.get(animal, &sstr!("tweety"))?, Some(tweety));
        assert_eq!(store.get(bird, &sstr!("cat"))?, None);

        let walkers = store
            .query(animal, Predicate::gte("legs", 3))
            .execute(&store)?;
        assert_eq!(walkers, vec![cat]);
        let named = store
            .query(animal, Predicate::eq("name", "tweety"))
            .execute(&store)?;
        assert_eq!(named, vec![tweety]);
        Ok(())
    }

    #[test]
    fn test_inherited_relationship_links_both_sides() -> Result<()> {
        let (mut store, keeper, animal, bird) = zoo()?;
        let sam = store.instantiate(keeper, record! { "name" => "sam" })?;
        let tweety = store.instantiate(bird, record! {})?;
        let cat = store.instantiate(animal, record! {})?;

        store.set_related(tweety, "keeper", Some(sam))?;
        store.push_related(sam, "animals", cat)?;

        assert_eq!(store.related(sam, "animals")?, vec![tweety, cat]);
        assert_eq!(store.related(cat, "keeper")?, vec![sam]);

        // Only members of the target family may be related
        let other = store.instantiate(keeper, record! {})?;
        let err = store.push_related(sam, "animals", other).unwrap_err();
        assert!(matches!(err, Error::InvalidChange(_)));
        Ok(())
    }

    #[test]
    fn test_child_in_later_namespace() -> Result<()> {
        let (mut store, _, animal, _) = zoo()?;
        store.install_namespace("farm", vec![SchemaDef::new("Cow").parent("default.Animal")])?;
        let cow = store.schema_by_name("farm.Cow")?;

        let daisy = store.instantiate(cow, record! { "name" => "daisy" })?;
        assert!(store.is_a(cow, animal));
        assert!(store.all(animal)?.contains(&daisy));
        assert_eq!(store.read(daisy, "legs")?, sint!(4));
        Ok(())
    }
}
