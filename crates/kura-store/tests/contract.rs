//! Behavior every backend topology must agree on.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use kura_store::paths::normalize;
use kura_store::{
    Backend, CompositeBackend, EditError, FileOpError, FilesystemBackend, FilesystemTools,
    GrepMatch, ReadError, RipgrepSearcher, SharedFiles, StateBackend, StoreBackend, ToolOutput, ToolResponse,
    apply_files_update, shared_files,
};

/// Write through a state backend and merge its delta, as the tool layer does.
fn state_write(backend: &StateBackend, path: &str, content: &str) {
    let written = backend.write(path, content).unwrap();
    apply_files_update(backend.files(), written.files_update);
}

/// Read every line back and strip the line-number gutter.
fn read_back(backend: &dyn Backend, path: &str, total_lines: usize) -> String {
    let rendered = backend.read(path, 0, total_lines.max(1)).unwrap();
    rendered
        .lines()
        .map(|line| line.split_once('\t').map_or("", |(_, text)| text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn normalize_is_idempotent() {
    for p in [
        "",
        "/",
        "a",
        "/a/",
        "//a//b/",
        "a\\b\\c",
        "/a/./b/../c",
        "../../x",
        "/x/..",
        "./.",
    ] {
        let once = normalize(p);
        assert_eq!(normalize(&once), once, "input {p:?}");
        assert!(once.starts_with('/'));
        assert!(once == "/" || !once.ends_with('/'), "input {p:?} gave {once:?}");
    }
}

#[test]
fn write_read_round_trip_state() {
    let backend = StateBackend::new(shared_files());
    let content = "first line\n  indented\ttab\n\nlast";
    state_write(&backend, "/notes/a.md", content);
    assert_eq!(read_back(&backend, "/notes/a.md", 4), content);
}

#[test]
fn write_read_round_trip_disk() {
    let tmp = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(tmp.path(), true);
    let content = "alpha\nbeta\n\ngamma";
    backend.write("/dir/round.txt", content).unwrap();
    assert_eq!(read_back(&backend, "/dir/round.txt", 4), content);
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("dir/round.txt")).unwrap(),
        content
    );
}

#[test]
fn edit_occurrence_law() {
    let store = StoreBackend::new(shared_files());
    store.write("/once.txt", "a foo b").unwrap();
    store.write("/thrice.txt", "foo foo foo").unwrap();

    let edited = store.edit("/once.txt", "foo", "bar", false).unwrap();
    assert_eq!(edited.occurrences, 1);

    let err = store.edit("/thrice.txt", "foo", "bar", false).unwrap_err();
    assert_eq!(err, EditError::Ambiguous { count: 3 });
    assert!(err.to_string().contains("3 times"));

    let edited = store.edit("/thrice.txt", "foo", "bar", true).unwrap();
    assert_eq!(edited.occurrences, 3);
    assert_eq!(read_back(&store, "/thrice.txt", 1), "bar bar bar");

    assert_eq!(
        store.edit("/once.txt", "bar", "bar", false).unwrap_err(),
        EditError::Identical
    );
}

#[test]
fn pagination_never_repeats_or_skips() {
    let backend = StateBackend::new(shared_files());
    let content = (1..=23)
        .map(|i| format!("line {i}"))
        .collect::<Vec<_>>()
        .join("\n");
    state_write(&backend, "/paged.txt", &content);

    for limit in [1, 4, 7, 23, 50] {
        let mut seen = Vec::new();
        let mut offset = 0;
        while offset < 23 {
            let page = backend.read("/paged.txt", offset, limit).unwrap();
            for line in page.lines() {
                if let Some((num, _)) = line.split_once('\t') {
                    seen.push(num.trim().parse::<usize>().unwrap());
                }
            }
            offset += limit;
        }
        assert_eq!(seen, (1..=23).collect::<Vec<_>>(), "limit {limit}");
    }
}

#[test]
fn composite_longest_prefix_wins() {
    let default_map = shared_files();
    let b1_map = shared_files();
    let b2_map = shared_files();
    let composite = CompositeBackend::new(
        Arc::new(StoreBackend::new(Arc::clone(&default_map))),
        [
            (
                "/a".to_string(),
                Arc::new(StoreBackend::new(Arc::clone(&b1_map))) as Arc<dyn Backend>,
            ),
            (
                "/a/b".to_string(),
                Arc::new(StoreBackend::new(Arc::clone(&b2_map))) as Arc<dyn Backend>,
            ),
        ],
    );

    composite.write("/a/b/c/file.txt", "deep").unwrap();
    composite.write("/a/file.txt", "shallow").unwrap();
    composite.write("/ab.txt", "unrouted").unwrap();

    assert!(b2_map.read().contains_key("/a/b/c/file.txt"));
    assert!(b1_map.read().contains_key("/a/file.txt"));
    assert!(!b1_map.read().contains_key("/a/b/c/file.txt"));
    assert!(default_map.read().contains_key("/ab.txt"));
}

#[test]
fn namespaces_are_isolated() {
    let shared: SharedFiles = shared_files();
    let alpha = StoreBackend::with_namespace(Arc::clone(&shared), "alpha");
    let beta = StoreBackend::with_namespace(Arc::clone(&shared), "beta");

    alpha.write("/secret.txt", "alpha only").unwrap();

    let err = beta.read("/secret.txt", 0, 10).unwrap_err();
    assert_eq!(err.kind(), Some(FileOpError::FileNotFound));
    assert!(matches!(err, ReadError::Op { .. }));
    assert!(beta.ls_info("/").is_empty());
    assert!(beta.glob_info("**/*.txt", "/").is_empty());
    assert!(beta.grep_raw("alpha", None, None).into_matches().is_empty());
}

#[tokio::test]
async fn hello_world_through_tools() {
    let state = shared_files();
    let tools = FilesystemTools::new(Arc::new(StateBackend::new(Arc::clone(&state))), state);
    assert!(tools.write_file("/hello.txt", "Hello, World!").await.is_success());

    let ToolResponse::Success(ToolOutput::Content { content }) =
        tools.read_file("/hello.txt", None, None).await
    else {
        panic!("expected content");
    };
    assert!(content.contains('1'));
    assert!(content.contains("Hello, World!"));
}

#[test]
fn disk_escape_is_refused() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    std::fs::create_dir(&root).unwrap();
    let backend = FilesystemBackend::new(&root, true);

    assert_eq!(
        backend.write("/../../etc/passwd", "x").unwrap_err(),
        FileOpError::InvalidPath
    );
    assert_eq!(
        backend.write("/../outside.txt", "x").unwrap_err(),
        FileOpError::InvalidPath
    );
    assert!(!tmp.path().join("outside.txt").exists());
    assert!(std::fs::read_dir(&root).unwrap().next().is_none());
}

#[test]
fn composite_grep_is_additive_and_glob_dedups() {
    let default_map = shared_files();
    let routed_map = shared_files();
    let composite = CompositeBackend::new(
        Arc::new(StoreBackend::new(Arc::clone(&default_map))),
        [(
            "/memories".to_string(),
            Arc::new(StoreBackend::new(Arc::clone(&routed_map))) as Arc<dyn Backend>,
        )],
    );

    composite.write("/main.py", "needle here").unwrap();
    composite.write("/memories/notes.py", "another needle").unwrap();
    // Shadowed by the route; glob must report the path once.
    default_map
        .write()
        .insert("/memories/notes.py".into(), kura_store::FileData::new("stale"));

    let matches = composite.grep_raw("needle", None, None).into_matches();
    assert_eq!(matches.len(), 2);
    assert!(matches.contains(&GrepMatch::new("/main.py", 1, "needle here")));
    assert!(matches.contains(&GrepMatch::new("/memories/notes.py", 1, "another needle")));

    let mut paths: Vec<String> = composite
        .glob_info("**/*.py", "/")
        .into_iter()
        .map(|info| info.path)
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["/main.py", "/memories/notes.py"]);
}

#[test]
fn disk_grep_does_not_depend_on_ripgrep() {
    let tmp = TempDir::new().unwrap();
    let fast = FilesystemBackend::new(tmp.path(), true);
    let scan = FilesystemBackend::new(tmp.path(), true)
        .with_searcher(RipgrepSearcher::new("/nonexistent/rg", Duration::from_secs(1)));

    fast.write("/.env", "needle=1").unwrap();
    fast.write("/visible.txt", "needle\r\nplain").unwrap();
    fast.write("/.ignore", "skipped.txt\n").unwrap();
    fast.write("/skipped.txt", "needle").unwrap();
    fast.write("/blob.bin", "needle\0\u{1}binary").unwrap();
    fast.write("/src/main.py", "needle").unwrap();
    fast.write("/src/lib/util.py", "x = 1\nneedle()").unwrap();
    std::fs::write(tmp.path().join("latin1.txt"), b"needle \xff\nneedle ok\n").unwrap();

    for (path, glob) in [
        (None, None),
        (Some("/src"), Some("lib/*.py")),
        (Some("/src"), Some("*.py")),
        (Some("/src"), Some("**/*.py")),
        (Some("/visible.txt"), None),
    ] {
        assert_eq!(
            fast.grep_raw("needle", path, glob),
            scan.grep_raw("needle", path, glob),
            "path {path:?} glob {glob:?}"
        );
    }

    let all: Vec<String> = scan
        .grep_raw("needle", None, None)
        .into_matches()
        .into_iter()
        .map(|m| m.path)
        .collect();
    for expected in ["/.env", "/skipped.txt", "/blob.bin", "/visible.txt"] {
        assert!(all.iter().any(|p| p == expected), "{expected} missing from {all:?}");
    }
    assert_eq!(
        scan.grep_raw("needle", Some("/src"), Some("lib/*.py"))
            .into_matches(),
        vec![GrepMatch::new("/src/lib/util.py", 2, "needle()")]
    );
    assert_eq!(
        scan.grep_raw("needle", Some("/latin1.txt"), None)
            .into_matches(),
        vec![GrepMatch::new("/latin1.txt", 2, "needle ok")]
    );
    assert_eq!(
        scan.grep_raw("needle", Some("/visible.txt"), None)
            .into_matches(),
        vec![GrepMatch::new("/visible.txt", 1, "needle")]
    );
}
