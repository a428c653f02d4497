mod cache;
mod inheritance;
mod positional;
mod relationships;

use crate::*;

/// `Person` and `Dog` in the default namespace; `Dog.owner` is a to-one side whose
/// reverse `Person.dogs` is to-many.
pub(crate) fn pets() -> Result<(Store, EntityType, EntityType)> {
    let mut store = Store::new();
    store.install_namespace(
        "default",
        vec![
            SchemaDef::new("Person")
                .attribute("name")
                .attribute("age")
                .attribute_with_default("colour", "blue"),
            SchemaDef::new("Dog")
                .attribute("name")
                .attribute("age")
                .relationship(RelationshipDef::new("owner", "Person").reverse("dogs")),
        ],
    )?;
    let person = store.schema_by_name("Person")?;
    let dog = store.schema_by_name("Dog")?;
    Ok((store, person, dog))
}
