use super::*;
use crate::cache::CacheEntry;
use tempfile::TempDir;

fn reference(path: &str, line: u32, enclosing: &str) -> Reference {
    Reference {
        location_path: format!("{}:{}:2-6", path, line),
        file_path: path.to_string(),
        folder_name: paths::parent_folder_name(path).to_string(),
        file_name: paths::file_name(path).to_string(),
        enclosing_symbol_name: enclosing.to_string(),
    }
}

fn decl(name: &str, line: u32, references: Vec<Reference>) -> Declaration {
    let mut d = Declaration::new(name, SymbolKind::Function, Position::new(line, 6, 10).unwrap());
    d.attach_references(references);
    d
}

fn sample_results() -> Vec<FileResult> {
    vec![
        FileResult::new(
            "qf/repo.go",
            vec![
                decl(
                    "Open",
                    10,
                    vec![
                        reference("/p/web/server.go", 40, "Serve"),
                        reference("/p/qf/course.go", 12, "NewCourse"),
                        reference("/p/qf/repo.go", 30, "reopen"),
                    ],
                ),
                decl("helper", 50, vec![]),
            ],
        ),
        FileResult::new(
            "qf/course.go",
            vec![decl("NewCourse", 8, vec![reference("/p/main.go", 5, "main")])],
        ),
        FileResult::new("web/server.go", vec![decl("Serve", 20, vec![])]),
        FileResult::new("main.go", vec![decl("main", 3, vec![])]),
    ]
}

#[test]
fn test_empty_input_yields_empty_root() {
    let root = build(Vec::new());
    assert_eq!(root.name, "");
    assert_eq!(root.path, "");
    assert!(root.is_empty());
    assert!(root.references.is_empty());
}

#[test]
fn test_folders_and_files() {
    let root = HierarchyBuilder::new("quickfeed").build(sample_results());
    assert_eq!(root.name, "quickfeed");

    assert_eq!(root.files.len(), 1);
    assert_eq!(root.files[0].name, "main.go");

    let folders: Vec<&String> = root.sub_folders.keys().collect();
    assert_eq!(folders, vec!["qf", "web"]);

    let qf = &root.sub_folders["qf"];
    assert_eq!(qf.path, "qf");
    let files: Vec<&str> = qf.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(files, vec!["course.go", "repo.go"]);
    assert_eq!(qf.files[1].path, "qf/repo.go");

    assert_eq!(root.file_count(), 4);
    assert_eq!(root.symbol_count(), 5);
}

#[test]
fn test_nested_folder_paths() {
    let root = build(vec![FileResult::new(
        "qf/db/sql.go",
        vec![decl("Query", 4, vec![])],
    )]);
    let db = root.folder_at("qf/db").unwrap();
    assert_eq!(db.name, "db");
    assert_eq!(db.path, "qf/db");
    assert_eq!(db.files[0].name, "sql.go");

    // Intermediate folder survives because of its subfolder
    assert!(root.folder_at("qf").unwrap().files.is_empty());
    assert!(root.folder_at("missing").is_none());
}

#[test]
fn test_reference_levels_by_name() {
    let root = build(sample_results());
    let qf = &root.sub_folders["qf"];

    // Use site in another folder goes to the folder
    let folder_refs: Vec<&str> = qf
        .references
        .iter()
        .map(|r| r.enclosing_symbol_name.as_str())
        .collect();
    assert_eq!(folder_refs, vec!["main", "Serve"]);

    // Use site in a sibling file goes to the file
    let repo = qf.files.iter().find(|f| f.name == "repo.go").unwrap();
    assert_eq!(repo.references.len(), 1);
    assert_eq!(repo.references[0].enclosing_symbol_name, "NewCourse");

    // Every reference stays on its declaration
    assert_eq!(repo.symbols[0].references.len(), 3);
}

#[test]
fn test_reference_levels_with_project_root() {
    let results = vec![
        FileResult::new(
            "api/v1/handler.go",
            vec![decl(
                "Handle",
                10,
                vec![
                    // Same folder name, different folder
                    reference("/p/internal/v1/client.go", 7, "Call"),
                    reference("/p/api/v1/routes.go", 3, "Route"),
                ],
            )],
        ),
    ];

    let by_name = build(results.clone());
    let v1 = by_name.folder_at("api/v1").unwrap();
    assert!(v1.references.is_empty());
    assert_eq!(v1.files[0].references.len(), 2);

    let by_path = HierarchyBuilder::default()
        .with_project_root("/p")
        .build(results);
    let v1 = by_path.folder_at("api/v1").unwrap();
    assert_eq!(v1.references.len(), 1);
    assert_eq!(v1.references[0].enclosing_symbol_name, "Call");
    assert_eq!(v1.files[0].references.len(), 1);
    assert_eq!(v1.files[0].references[0].enclosing_symbol_name, "Route");
}

#[test]
fn test_merge_is_commutative() {
    let forward = build(sample_results());
    let mut reversed_input = sample_results();
    reversed_input.reverse();
    let reversed = build(reversed_input);
    assert_eq!(forward, reversed);
}

#[test]
fn test_same_named_files_merge_symbols() {
    let a = FileResult::new("qf/repo.go", vec![decl("Open", 10, vec![])]);
    let b = FileResult::new("qf/repo.go", vec![decl("Close", 5, vec![])]);

    let ab = build(vec![a.clone(), b.clone()]);
    let ba = build(vec![b, a]);
    assert_eq!(ab, ba);

    let qf = &ab.sub_folders["qf"];
    assert_eq!(qf.files.len(), 1);
    let names: Vec<&str> = qf.files[0].symbols.iter().map(|s| s.name.as_str()).collect();
    // Sorted by position
    assert_eq!(names, vec!["Close", "Open"]);
}

#[test]
fn test_result_without_file_name_ignored() {
    let root = build(vec![FileResult::new("", vec![decl("x", 1, vec![])])]);
    assert!(root.is_empty());
}

#[test]
fn test_zero_reference_policy() {
    let flagged = build(sample_results());
    let repo = &flagged.sub_folders["qf"].files[1];
    let helper = repo.symbols.iter().find(|s| s.name == "helper").unwrap();
    assert!(helper.zero_references);

    let suppressed = HierarchyBuilder::default()
        .with_policy(ZeroReferencePolicy::Suppress)
        .build(sample_results());
    let repo = &suppressed.sub_folders["qf"].files[1];
    assert!(repo.symbols.iter().all(|s| s.name != "helper"));
    // web/server.go only had an unused declaration, the file itself stays
    assert_eq!(suppressed.sub_folders["web"].files[0].symbols.len(), 0);
}

#[test]
fn test_from_cache() {
    let dir = TempDir::new().unwrap();
    let mut cache = IndexCache::load(&dir.path().join("cache.json")).unwrap();
    for result in sample_results() {
        let name = paths::file_name(&result.relative_path).to_string();
        cache
            .commit(&name, CacheEntry::new(result.relative_path, 1, result.declarations))
            .unwrap();
    }

    let root = from_cache(&cache, "quickfeed", ZeroReferencePolicy::Flag);
    assert_eq!(root, HierarchyBuilder::new("quickfeed").build(sample_results()));
}

#[test]
fn test_policy_serde_names() {
    assert_eq!(
        serde_json::to_string(&ZeroReferencePolicy::Suppress).unwrap(),
        "\"suppress\""
    );
    let policy: ZeroReferencePolicy = serde_json::from_str("\"flag\"").unwrap();
    assert_eq!(policy, ZeroReferencePolicy::Flag);
}

#[test]
fn test_json_shape() {
    let root = build(sample_results());
    let value = serde_json::to_value(&root).unwrap();
    assert!(value["subFolders"]["qf"]["files"].is_array());
    assert_eq!(
        value["subFolders"]["qf"]["files"][1]["symbols"][0]["position"]["columnStart"],
        6
    );

    let back: HierarchyNode = serde_json::from_value(value).unwrap();
    assert_eq!(back, root);
}

#[test]
fn test_prune_removes_empty_folders_bottom_up() {
    let mut root = HierarchyNode::folder("quickfeed", "");
    root.folder_mut(&["assets"]);
    root.folder_mut(&["web", "static"]);
    root.folder_mut(&["qf", "db", "sql"]);
    root.folder_mut(&["qf", "db", "sql"]).files.push(FileNode {
        name: "schema.go".to_string(),
        path: "qf/db/sql/schema.go".to_string(),
        references: Vec::new(),
        symbols: Vec::new(),
    });
    root.folder_mut(&["qf", "db", "empty"]);

    root.prune();

    assert!(root.folder_at("assets").is_none());
    assert!(root.folder_at("web").is_none());
    assert!(root.folder_at("qf/db/empty").is_none());
    assert_eq!(root.sub_folders.keys().collect::<Vec<_>>(), vec!["qf"]);

    let qf = root.folder_at("qf").unwrap();
    assert!(qf.files.is_empty());
    assert_eq!(qf.sub_folders.keys().collect::<Vec<_>>(), vec!["db"]);
    let sql = root.folder_at("qf/db/sql").unwrap();
    assert_eq!(sql.path, "qf/db/sql");
    assert_eq!(sql.files.len(), 1);
    assert_eq!(root.file_count(), 1);
}
