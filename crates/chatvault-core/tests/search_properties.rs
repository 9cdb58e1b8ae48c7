//! Property tests for substring AND search.

use chatvault_core::ChatStore;
use chatvault_types::{NewProject, Role};
use proptest::prelude::*;

fn store_with(contents: &[String]) -> (ChatStore, Vec<i64>) {
    let store = ChatStore::open_in_memory().unwrap();
    let project = store.create_project(&NewProject::new("P", "")).unwrap();
    let thread = store.create_thread(project.id, None).unwrap();
    let ids = contents
        .iter()
        .map(|c| store.append_message(thread.id, Role::User, c).unwrap().id)
        .collect();
    (store, ids)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn substring_query_finds_message(
        content in "[a-zA-Z ]{1,40}",
        start in 0usize..40,
        len in 1usize..10,
    ) {
        let start = start.min(content.len() - 1);
        let end = (start + len).min(content.len());
        let query = content[start..end].to_uppercase();
        prop_assume!(!query.trim().is_empty());

        let (store, ids) = store_with(&[content.clone()]);
        let hits = store.search_messages(&query).unwrap();
        prop_assert!(hits.iter().any(|m| m.id == ids[0]));
    }

    #[test]
    fn two_terms_match_iff_both_present(
        contents in prop::collection::vec("[abc]{0,6}", 1..8),
        a in "[abc]{1,2}",
        b in "[abc]{1,2}",
    ) {
        let (store, ids) = store_with(&contents);
        let hits: Vec<i64> = store
            .search_messages(&format!("{a} {b}"))
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        for (content, id) in contents.iter().zip(&ids) {
            let expected = content.contains(&a) && content.contains(&b);
            prop_assert_eq!(hits.contains(id), expected, "content {:?}", content);
        }
    }
}
