mod common;

use common::{Post, memory_store};
use docmodel::prelude::*;
use pretty_assertions::assert_eq;

async fn posts(store: &DocumentStore) -> EntitySet<Entity<Post>> {
    let repository = store.repository::<Post>();
    for (title, views, published) in [("a", 1, true), ("b", 2, false), ("c", 3, true)] {
        repository
            .create(doc! { "title": title, "views": views, "published": published })
            .await
            .unwrap();
    }

    repository.query().order_by("title", SortDirection::Asc).get().await.unwrap()
}

#[tokio::test]
async fn batch_helpers_read_through_entities() {
    let store = memory_store().await;
    let set = posts(&store).await;

    let groups = set.group_by("published");
    assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["1", "0"]);
    assert_eq!(groups["1"].len(), 2);

    let keyed = set.key_by("_id");
    let first = set.first().unwrap();
    assert_eq!(keyed[&first.id_string()].get("title"), Some(Bson::from("a")));

    assert_eq!(
        set.combine("title", "views").into_iter().collect::<Vec<_>>(),
        vec![
            ("a".to_string(), Bson::Int64(1)),
            ("b".to_string(), Bson::Int64(2)),
            ("c".to_string(), Bson::Int64(3)),
        ]
    );
}

#[tokio::test]
async fn unset_keeps_later_positions() {
    let store = memory_store().await;
    let mut set = posts(&store).await;

    let removed = set.unset(1).unwrap();
    assert_eq!(removed.get("title"), Some(Bson::from("b")));

    assert_eq!(set.len(), 2);
    assert!(set.get(1).is_none());
    assert_eq!(set.get(2).and_then(|post| post.get("title")), Some(Bson::from("c")));
    assert_eq!(
        set.entries().map(|(index, _)| index).collect::<Vec<_>>(),
        vec![0, 2]
    );
}

#[tokio::test]
async fn json_renders_every_member() {
    let store = memory_store().await;
    let set = posts(&store).await;

    let json: serde_json::Value = serde_json::from_str(&set.to_json().unwrap()).unwrap();
    let rendered = json.as_array().unwrap();

    assert_eq!(rendered.len(), 3);
    assert_eq!(rendered[2]["title"], serde_json::Value::from("c"));
    assert_eq!(
        rendered[0]["id"],
        serde_json::Value::from(set.first().unwrap().id_string())
    );
    assert_eq!(set.chunk(2).iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 1]);
}
