#[cfg(test)]
mod tests {
    use crate::test::pets;
    use crate::*;

    /// Every resolved edge must be present on both sides.
    fn assert_bidirectional(store: &Store, owner: EntityId, rel: &str) -> Result<()> {
        let mirror = store.schema_of(owner)?.relation(rel).unwrap().mirror.clone();
        for target in store.linked(owner, rel)? {
            assert!(
                store.linked(target, &mirror)?.contains(&owner),
                "{} missing from {}.{}",
                owner,
                target,
                mirror
            );
        }
        Ok(())
    }

    fn marriages() -> Result<(Store, EntityType)> {
        let mut store = Store::new();
        store.install_namespace(
            "default",
            vec![SchemaDef::new("Person")
                .attribute("name")
                .relationship(RelationshipDef::new("spouse", "Person").kind("1:1").reverse("spouse_of"))],
        )?;
        let person = store.schema_by_name("Person")?;
        Ok((store, person))
    }

    #[test]
    fn test_set_related_updates_reverse_side() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let alice = store.instantiate(person, record! {})?;
        let rex = store.instantiate(dog, record! {})?;
        let fido = store.instantiate(dog, record! {})?;

        store.set_related(rex, "owner", Some(alice))?;
        store.set_related(fido, "owner", Some(alice))?;

        assert_eq!(store.related(alice, "dogs")?, vec![rex, fido]);
        assert_eq!(store.read(rex, "owner")?, sref!(alice));
        assert_bidirectional(&store, alice, "dogs")?;
        assert_bidirectional(&store, rex, "owner")?;
        Ok(())
    }

    #[test]
    fn test_reassign_leaves_no_stale_edge() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let alice = store.instantiate(person, record! {})?;
        let bob = store.instantiate(person, record! {})?;
        let rex = store.instantiate(dog, record! {})?;

        store.set_related(rex, "owner", Some(alice))?;
        store.set_related(rex, "owner", Some(bob))?;

        assert_eq!(store.related(alice, "dogs")?, vec![]);
        assert_eq!(store.related(bob, "dogs")?, vec![rex]);

        store.set_related(rex, "owner", None)?;
        assert_eq!(store.related(bob, "dogs")?, vec![]);
        assert_eq!(store.read(rex, "owner")?, sref!());
        Ok(())
    }

    #[test]
    fn test_to_one_reverse_steals_target() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let alice = store.instantiate(person, record! {})?;
        let bob = store.instantiate(person, record! {})?;
        let rex = store.instantiate(dog, record! {})?;

        store.push_related(alice, "dogs", rex)?;
        // Rex can only have one owner, so adding him to Bob takes him from Alice
        store.push_related(bob, "dogs", rex)?;

        assert_eq!(store.linked(alice, "dogs")?, vec![]);
        assert_eq!(store.linked(bob, "dogs")?, vec![rex]);
        assert_eq!(store.linked(rex, "owner")?, vec![bob]);
        Ok(())
    }

    #[test]
    fn test_one_to_one_on_both_sides() -> Result<()> {
        let (mut store, person) = marriages()?;
        let a = store.instantiate(person, record! { "name" => "a" })?;
        let b = store.instantiate(person, record! { "name" => "b" })?;
        let c = store.instantiate(person, record! { "name" => "c" })?;

        store.set_related(a, "spouse", Some(b))?;
        assert_eq!(store.linked(b, "spouse_of")?, vec![a]);

        store.set_related(c, "spouse", Some(b))?;
        assert_eq!(store.linked(b, "spouse_of")?, vec![c]);
        assert_eq!(store.linked(a, "spouse")?, vec![]);
        assert_bidirectional(&store, c, "spouse")?;
        Ok(())
    }

    #[test]
    fn test_many_to_many_splice() -> Result<()> {
        let mut store = Store::new();
        store.install_namespace(
            "default",
            vec![
                SchemaDef::new("Tag").attribute("label"),
                SchemaDef::new("Note")
                    .relationship(RelationshipDef::new("tags", "Tag").kind("n:n").reverse("notes")),
            ],
        )?;
        let tag = store.schema_by_name("Tag")?;
        let note = store.schema_by_name("Note")?;
        let red = store.instantiate(tag, record! { "label" => "red" })?;
        let blue = store.instantiate(tag, record! { "label" => "blue" })?;
        let green = store.instantiate(tag, record! { "label" => "green" })?;
        let first = store.instantiate(note, record! {})?;
        let second = store.instantiate(note, record! {})?;

        store.splice_related(first, "tags", 0, 0, vec![red, blue])?;
        store.splice_related(second, "tags", 0, 0, vec![red])?;
        assert_eq!(store.linked(red, "notes")?, vec![first, second]);

        let removed = store.splice_related(first, "tags", 0, 1, vec![green, blue])?;
        assert_eq!(removed, vec![red]);
        // blue was already related and is skipped
        assert_eq!(store.linked(first, "tags")?, vec![green, blue]);
        assert_eq!(store.linked(red, "notes")?, vec![second]);
        assert_bidirectional(&store, first, "tags")?;
        assert_bidirectional(&store, red, "notes")?;

        assert!(store.remove_related(first, "tags", green)?);
        assert!(!store.remove_related(first, "tags", green)?);
        assert_eq!(store.linked(green, "notes")?, vec![]);
        Ok(())
    }

    #[test]
    fn test_splice_related_emits_one_event_per_side() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let alice = store.instantiate(person, record! {})?;
        let rex = store.instantiate(dog, record! {})?;

        let kinds = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = kinds.clone();
        store.subscribe(Channel::Global, move |event, _| {
            sink.borrow_mut().push((event.entity_id, event.kind))
        });
        store.push_related(alice, "dogs", rex)?;

        assert_eq!(
            *kinds.borrow(),
            vec![(alice, ChangeKind::Splice), (rex, ChangeKind::Set)]
        );
        Ok(())
    }

    #[test]
    fn test_wrong_cardinality_and_unknown_relationship() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let alice = store.instantiate(person, record! {})?;
        let rex = store.instantiate(dog, record! {})?;

        let err = store.set_related(alice, "dogs", Some(rex)).unwrap_err();
        assert!(matches!(err, Error::RelationshipCardinality(_, _)));
        assert!(err.is_fatal());

        let err = store.splice_related(rex, "owner", 0, 0, vec![alice]).unwrap_err();
        assert!(matches!(err, Error::RelationshipCardinality(_, _)));

        let err = store.related(rex, "walker").unwrap_err();
        assert!(matches!(err, Error::RelationshipNotInstalled(_, _)));

        let err = store.splice_related(alice, "dogs", 3, 0, vec![rex]).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfBounds(3, 0)));

        let err = store.set_related(rex, "owner", Some(rex)).unwrap_err();
        assert!(matches!(err, Error::InvalidChange(_)));
        Ok(())
    }

    #[test]
    fn test_faults_materialize_from_cache() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let rex = store.instantiate(dog, record! { "name" => "rex", "owner" => "alice" })?;

        assert!(store.is_fault(rex, "owner")?);
        assert_eq!(store.related_ids(rex, "owner")?, vec![sstr!("alice")]);
        assert_eq!(store.related(rex, "owner")?, vec![]);

        let alice = store.instantiate(person, record! { "id" => "alice" })?;
        assert_eq!(store.related(rex, "owner")?, vec![alice]);
        assert!(!store.is_fault(rex, "owner")?);
        assert_eq!(store.linked(alice, "dogs")?, vec![rex]);
        assert_eq!(store.related_ids(rex, "owner")?, vec![sstr!("alice")]);
        Ok(())
    }

    #[test]
    fn test_to_many_faults_keep_order_of_known_targets() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let rex = store.instantiate(dog, record! { "id" => 1 })?;
        let alice = store.instantiate(
            person,
            record! { "dogs" => vec![sint!(1), sint!(2)] },
        )?;

        assert!(store.is_fault(alice, "dogs")?);
        assert_eq!(store.linked(alice, "dogs")?, vec![rex]);
        assert_eq!(store.related_ids(alice, "dogs")?, vec![sint!(1), sint!(2)]);

        let fido = store.instantiate(dog, record! { "id" => 2 })?;
        assert_eq!(store.related(alice, "dogs")?, vec![rex, fido]);
        assert_eq!(store.linked(fido, "owner")?, vec![alice]);
        assert!(!store.is_fault(alice, "dogs")?);
        Ok(())
    }

    #[test]
    fn test_related_ids_fall_back_to_local_reference() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let alice = store.instantiate(person, record! {})?;
        let rex = store.instantiate(dog, record! { "owner" => alice })?;
        assert_eq!(store.related_ids(rex, "owner")?, vec![sref!(alice)]);
        Ok(())
    }

    #[test]
    fn test_removal_keeps_edges() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        let alice = store.instantiate(person, record! {})?;
        let rex = store.instantiate(dog, record! {})?;
        store.set_related(rex, "owner", Some(alice))?;

        store.remove(rex)?;
        assert_eq!(store.linked(alice, "dogs")?, vec![rex]);
        let err = store.set_related(rex, "owner", None).unwrap_err();
        assert!(matches!(err, Error::EntityRemoved(_)));

        store.restore(rex)?;
        assert_eq!(store.linked(rex, "owner")?, vec![alice]);
        assert_bidirectional(&store, alice, "dogs")?;
        Ok(())
    }

    #[test]
    fn test_map_updates_relationships() -> Result<()> {
        let (mut store, person, dog) = pets()?;
        store.map(
            person,
            vec![record! { "id" => "alice" }, record! { "id" => "bob" }],
            MapOptions::default(),
        )?;
        let alice = store.get(person, &sstr!("alice"))?.unwrap();
        let bob = store.get(person, &sstr!("bob"))?.unwrap();

        let rex = store.map(dog, vec![record! { "id" => 1, "owner" => "alice" }], MapOptions::default())?[0];
        store.map(dog, vec![record! { "id" => 1, "owner" => "bob" }], MapOptions::default())?;

        assert_eq!(store.linked(rex, "owner")?, vec![bob]);
        assert_eq!(store.linked(alice, "dogs")?, vec![]);
        assert_eq!(store.linked(bob, "dogs")?, vec![rex]);
        Ok(())
    }
}
