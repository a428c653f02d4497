#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::test::pets;
    use crate::*;

    fn indexes(store: &Store, positional: &PositionalQuery) -> Result<Vec<Value>> {
        positional
            .results()
            .into_iter()
            .map(|id| positional.index_value(store, id))
            .collect()
    }

    fn dense(len: usize) -> Vec<Value> {
        (0..len).map(Value::from).collect()
    }

    #[test]
    fn test_init_merges_existing_indexes() -> Result<()> {
        let (mut store, person, _) = pets()?;
        let a = store.instantiate(person, record! { "index" => 2 })?;
        let b = store.instantiate(person, record! { "index" => 2 })?;
        let c = store.instantiate(person, record! {})?;

        let mut positional = PositionalQuery::new(store.query(person, Predicate::All), "index");
        let results = positional.init(&mut store)?;

        // a keeps 2, c takes the first free slot, b was displaced by the duplicate
        assert_eq!(results, vec![c, b, a]);
        assert_eq!(indexes(&store, &positional)?, dense(3));
        Ok(())
    }

    #[test]
    fn test_init_compacts_out_of_range_indexes() -> Result<()> {
        let (mut store, person, _) = pets()?;
        let a = store.instantiate(person, record! { "index" => 40 })?;
        let b = store.instantiate(person, record! { "index" => 7 })?;
        let c = store.instantiate(person, record! { "index" => 0 })?;

        let mut positional = PositionalQuery::with_default_field(store.query(person, Predicate::All), &store);
        assert_eq!(positional.field(), "index");
        assert_eq!(positional.init(&mut store)?, vec![c, b, a]);
        assert_eq!(indexes(&store, &positional)?, dense(3));
        Ok(())
    }

    #[test]
    fn test_init_drops_query_order() -> Result<()> {
        let (mut store, person, _) = pets()?;
        let young = store.instantiate(person, record! { "age" => 1, "index" => 1 })?;
        let old = store.instantiate(person, record! { "age" => 90, "index" => 0 })?;

        let mut positional =
            PositionalQuery::new(store.query(person, Predicate::All).order_by("age"), "index");
        assert_eq!(positional.init(&mut store)?, vec![old, young]);

        // Order field writes no longer reorder
        store.write(old, "age", 100)?;
        assert_eq!(positional.results(), vec![old, young]);
        Ok(())
    }

    #[test]
    fn test_move_item() -> Result<()> {
        let (mut store, person, _) = pets()?;
        let ids: Vec<EntityId> = (0..4)
            .map(|i| store.instantiate(person, record! { "index" => i }))
            .collect::<Result<_>>()?;
        let mut positional = PositionalQuery::new(store.query(person, Predicate::All), "index");
        positional.init(&mut store)?;

        positional.move_item(&mut store, 0, 2)?;
        assert_eq!(positional.results(), vec![ids[1], ids[2], ids[0], ids[3]]);
        assert_eq!(indexes(&store, &positional)?, dense(4));
        assert_eq!(positional.index_of(ids[0]), Some(2));

        positional.move_item(&mut store, 3, 0)?;
        assert_eq!(positional.results(), vec![ids[3], ids[1], ids[2], ids[0]]);
        assert_eq!(store.read(ids[3], "index")?, sint!(0));
        Ok(())
    }

    #[test]
    fn test_swaps() -> Result<()> {
        let (mut store, person, _) = pets()?;
        let ids: Vec<EntityId> = (0..3)
            .map(|i| store.instantiate(person, record! { "index" => i }))
            .collect::<Result<_>>()?;
        let outsider = store.instantiate(person, record! { "colour" => "red" })?;
        let mut positional =
            PositionalQuery::new(store.query(person, Predicate::eq("colour", "blue")), "index");
        positional.init(&mut store)?;

        positional.swap_objects_at_indexes(&mut store, 0, 2)?;
        assert_eq!(positional.results(), vec![ids[2], ids[1], ids[0]]);

        positional.swap_objects(&mut store, ids[1], ids[2])?;
        assert_eq!(positional.results(), vec![ids[1], ids[2], ids[0]]);
        assert_eq!(indexes(&store, &positional)?, dense(3));

        let err = positional.swap_objects(&mut store, ids[0], outsider).unwrap_err();
        assert!(matches!(err, Error::NotInResults(id) if id == outsider));
        Ok(())
    }

    #[test]
    fn test_index_errors() -> Result<()> {
        let (mut store, person, _) = pets()?;
        store.instantiate(person, record! {})?;
        let mut positional = PositionalQuery::new(store.query(person, Predicate::All), "index");

        assert!(matches!(
            positional.move_item(&mut store, 0, 0),
            Err(Error::InvalidChange(_))
        ));

        positional.init(&mut store)?;
        let err = positional.move_item(&mut store, 0, 1).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfBounds(1, 1)));
        assert!(err.is_fatal());
        assert!(matches!(
            positional.swap_objects_at_indexes(&mut store, 3, 0),
            Err(Error::IndexOutOfBounds(3, 1))
        ));

        positional.dispose(&mut store);
        assert!(matches!(positional.normalize(&mut store), Err(Error::LiveQueryDisposed)));
        assert!(matches!(positional.init(&mut store), Err(Error::LiveQueryDisposed)));
        Ok(())
    }

    #[test]
    fn test_new_member_is_appended_and_stamped() -> Result<()> {
        let (mut store, person, _) = pets()?;
        let a = store.instantiate(person, record! {})?;
        let b = store.instantiate(person, record! {})?;
        let mut positional = PositionalQuery::new(store.query(person, Predicate::All), "index");
        positional.init(&mut store)?;

        let c = store.instantiate(person, record! { "index" => 0 })?;
        assert_eq!(positional.results(), vec![a, b, c]);
        assert_eq!(store.read(c, "index")?, sint!(2));

        store.remove(a)?;
        assert_eq!(positional.results(), vec![b, c]);
        assert_eq!(indexes(&store, &positional)?, dense(2));
        Ok(())
    }

    #[test]
    fn test_external_index_write_reorders() -> Result<()> {
        let (mut store, person, _) = pets()?;
        let a = store.instantiate(person, record! {})?;
        let b = store.instantiate(person, record! {})?;
        let c = store.instantiate(person, record! {})?;
        let mut positional = PositionalQuery::new(store.query(person, Predicate::All), "index");
        positional.init(&mut store)?;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        positional.on_change(move |results| sink.borrow_mut().push(results.to_vec()));

        store.write(a, "index", 10)?;
        assert_eq!(positional.results(), vec![b, c, a]);
        assert_eq!(seen.borrow().last(), Some(&vec![b, c, a]));

        positional.normalize(&mut store)?;
        assert_eq!(store.read(a, "index")?, sint!(2));
        assert_eq!(positional.len(), 3);
        Ok(())
    }
}
