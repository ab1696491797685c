//! Integration tests for the full persistence pipeline.
//!
//! Tests: Mapper → Serializer → InMemoryDataSource → Retrieval → IdentityMap
//!
//! Verifies:
//! - saves only transmit changed attributes, so independent mappers compose
//! - associations round-trip as references, including inside arrays
//! - atomic counters accumulate across mapper instances

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use docmap_core::{ClassName, Entity, Reference, Value, attributes_from_json};
    use docmap_mapper::{ClassMapping, Mapper, MapperRegistry, Registry};
    use serde_json::json;

    use crate::data_source::InMemoryDataSource;

    fn setup() -> (Arc<InMemoryDataSource>, Registry) {
        let store = Arc::new(InMemoryDataSource::new());
        let registry = Registry::new(store.clone());
        registry
            .register(
                ClassMapping::new("Article")
                    .attribute("title")
                    .attribute("body")
                    .attribute("author")
                    .attribute("views"),
            )
            .register(ClassMapping::new("User").attribute("name"))
            .register(ClassMapping::new("Book").attribute("title").attribute("authors"));
        (store, registry)
    }

    fn mapper(registry: &Registry, class: &str) -> Mapper {
        registry
            .mapper_for(&ClassName::from(class))
            .expect("class is registered")
    }

    fn inserted_article(registry: &Registry) -> Entity {
        let article = Entity::new("Article").with("views", 0);
        mapper(registry, "Article").insert(&article).unwrap();
        article
    }

    #[test]
    fn update_writes_given_attributes() {
        let (_store, registry) = setup();
        let articles = mapper(&registry, "Article");
        let article = inserted_article(&registry);

        articles
            .update(&article, attributes_from_json(json!({"title": "I has a new title!"})))
            .unwrap();

        let fresh = mapper(&registry, "Article");
        let found = fresh.find(&articles.id_for(&article).unwrap()).unwrap();
        assert_eq!(found.get("title"), Some(Value::from("I has a new title!")));
    }

    #[test]
    fn save_persists_changes() {
        let (_store, registry) = setup();
        let articles = mapper(&registry, "Article");
        let article = Entity::new("Article");
        articles.insert(&article).unwrap();

        article.set("title", "I has a new title!");
        articles.save(&article).unwrap();

        let found = mapper(&registry, "Article").find(&article.id().unwrap()).unwrap();
        assert_eq!(found.get("title"), Some(Value::from("I has a new title!")));
    }

    #[test]
    fn only_changed_attributes_are_saved() {
        let (store, registry) = setup();
        let id = inserted_article(&registry).id().unwrap();

        let first_mapper = mapper(&registry, "Article");
        let second_mapper = mapper(&registry, "Article");
        let first_article = first_mapper.find(&id).unwrap();
        let second_article = second_mapper.find(&id).unwrap();

        // change different attributes on each
        first_article.set("title", "New title");
        second_article.set("views", 7);
        first_mapper.save(&first_article).unwrap();
        second_mapper.save(&second_article).unwrap();

        let canonical = mapper(&registry, "Article").find(&id).unwrap();
        assert_eq!(canonical.get("title"), Some(Value::from("New title")));
        assert_eq!(canonical.get("views"), Some(Value::Integer(7)));
        assert_eq!(store.stats().updates, 2);
    }

    #[test]
    fn request_scoped_mappers_do_not_resend_stale_attributes() {
        let (store, registry) = setup();
        let id = inserted_article(&registry).id().unwrap();
        let scope = Arc::new(docmap_mapper::IdentityMap::new());
        let class = ClassName::from("Article");
        let reader = registry.scoped_mapper_for(&class, scope.clone()).unwrap();
        let writer = registry.scoped_mapper_for(&class, scope).unwrap();

        reader.find(&id).unwrap();
        let elsewhere = mapper(&registry, "Article");
        let edited = elsewhere.find(&id).unwrap();
        edited.set("views", 7);
        elsewhere.save(&edited).unwrap();

        let shared = writer.find(&id).unwrap();
        shared.set("title", "Scoped edit");
        writer.save(&shared).unwrap();

        let record = store.record(&class, &id).unwrap();
        assert_eq!(record.attributes["views"], Value::Integer(7));
        assert_eq!(record.attributes["title"], Value::from("Scoped edit"));
    }

    #[test]
    fn scalar_association_round_trips_as_reference() {
        let (_store, registry) = setup();
        let articles = mapper(&registry, "Article");
        let article = inserted_article(&registry);
        let user = Entity::new("User").with("name", "Dave");

        article.set("author", user.clone());
        articles.save(&article).unwrap();

        let retrieved = articles.find(&article.id().unwrap()).unwrap();
        retrieved.set("title", "I has a new title!");
        articles.save(&retrieved).unwrap();

        let retrieved = mapper(&registry, "Article").find(&retrieved.id().unwrap()).unwrap();
        assert_eq!(
            retrieved.get("author"),
            Some(Value::Reference(Reference::new("User", user.id().unwrap())))
        );
    }

    #[test]
    fn appending_to_a_referenced_collection_keeps_existing_references() {
        let (_store, registry) = setup();
        let dave = Entity::new("User").with("name", "Dave");
        let andy = Entity::new("User").with("name", "Andy");
        let book = Entity::new("Book")
            .with("title", "Title")
            .with("authors", vec![dave.clone()]);
        let books = mapper(&registry, "Book");
        books.insert(&book).unwrap();

        let retrieved = books.find(&books.id_for(&book).unwrap()).unwrap();
        assert!(retrieved.push("authors", andy.clone()));
        books.save(&retrieved).unwrap();

        let authors = mapper(&registry, "Book")
            .find(&retrieved.id().unwrap())
            .unwrap()
            .get("authors")
            .unwrap();
        let references: Vec<Reference> = authors
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_reference().cloned().unwrap())
            .collect();
        assert_eq!(
            references,
            vec![
                Reference::new("User", dave.id().unwrap()),
                Reference::new("User", andy.id().unwrap()),
            ]
        );
    }

    #[test]
    fn increments_accumulate_in_the_store() {
        let (_store, registry) = setup();
        let articles = mapper(&registry, "Article");
        let article = inserted_article(&registry);

        articles.increment_by_one(&article, "views").unwrap();
        articles.increment(&article, "views", 10).unwrap();

        let found = mapper(&registry, "Article").find(&article.id().unwrap()).unwrap();
        assert_eq!(found.get("views"), Some(Value::Integer(11)));
    }

    #[test]
    fn decrements_accumulate_in_the_store() {
        let (_store, registry) = setup();
        let articles = mapper(&registry, "Article");
        let article = inserted_article(&registry);

        articles.decrement_by_one(&article, "views").unwrap();
        articles.decrement(&article, "views", 10).unwrap();

        let found = mapper(&registry, "Article").find(&article.id().unwrap()).unwrap();
        assert_eq!(found.get("views"), Some(Value::Integer(-11)));
    }

    #[test]
    fn increments_from_stale_mappers_are_not_lost() {
        let (_store, registry) = setup();
        let id = inserted_article(&registry).id().unwrap();
        let first_mapper = mapper(&registry, "Article");
        let second_mapper = mapper(&registry, "Article");
        let first = first_mapper.find(&id).unwrap();
        let second = second_mapper.find(&id).unwrap();

        first_mapper.increment(&first, "views", 2).unwrap();
        second_mapper.increment(&second, "views", 3).unwrap();
        // saving an unrelated change must not write the stale counter back
        first.set("title", "Edited");
        first_mapper.save(&first).unwrap();

        let found = mapper(&registry, "Article").find(&id).unwrap();
        assert_eq!(found.get("views"), Some(Value::Integer(5)));
        assert_eq!(found.get("title"), Some(Value::from("Edited")));
    }

    #[test]
    fn sorted_pages_come_back_in_order() {
        let (_store, registry) = setup();
        let articles = mapper(&registry, "Article");
        for views in [5, 1, 4, 2, 3] {
            articles
                .insert(&Entity::new("Article").with("views", views))
                .unwrap();
        }

        let sorted = articles.all().sort("views");
        let second_page = sorted.per_page(2).page(2).to_a().unwrap();
        let views: Vec<Value> = second_page.iter().map(|a| a.get("views").unwrap()).collect();
        assert_eq!(views, vec![Value::Integer(3), Value::Integer(4)]);

        let top = sorted.reverse().limit(1).first().unwrap().unwrap();
        assert_eq!(top.get("views"), Some(Value::Integer(5)));
    }

    #[test]
    fn overlapping_retrievals_share_instances() {
        let (_store, registry) = setup();
        let articles = mapper(&registry, "Article");
        for title in ["a", "b", "c"] {
            articles
                .insert(&Entity::new("Article").with("title", title))
                .unwrap();
        }

        let reader = mapper(&registry, "Article");
        let all = reader.all().to_a().unwrap();
        let b = reader
            .select(docmap_mapper::Query::all().eq("title", "b"))
            .first()
            .unwrap()
            .unwrap();
        assert!(b.same_instance(&all[1]));
        assert!(reader.find(&b.id().unwrap()).unwrap().same_instance(&b));
    }
}
