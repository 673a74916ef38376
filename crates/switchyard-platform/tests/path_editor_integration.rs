use std::path::Path;
use std::sync::Arc;

use switchyard_platform::{
    EnvironmentStore, FileStore, PATH_SEPARATOR, PathEditor, PathSignature,
};

#[test]
fn file_backed_switching_keeps_one_entry_per_runtime() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = Arc::new(FileStore::new(temp.path().join("path")));
    let editor = PathEditor::new(store.clone()).with_lock_file(temp.path().join("path.lock"));
    let go_root = temp.path().join("packages").join("go");
    let node_root = temp.path().join("packages").join("node");
    let go = PathSignature::new("go", "bin", &go_root);
    let node = PathSignature::new("node", "linux-x64", &node_root);

    editor
        .add(&go, &go_root.join("go1.21.0").join("go").join("bin"))
        .expect("activate go1.21.0");
    editor
        .add(
            &node,
            &node_root
                .join("v20.11.1")
                .join("node-v20.11.1-linux-x64")
                .join("bin"),
        )
        .expect("activate node");
    editor
        .add(&go, &go_root.join("go1.22.3").join("go").join("bin"))
        .expect("switch go");

    let value = store
        .read_user_path()
        .expect("store readable")
        .expect("value was written");
    let segments: Vec<&str> = value.split(PATH_SEPARATOR).collect();
    assert_eq!(segments.len(), 2);
    assert_eq!(
        editor.read_active(&go).expect("read works").as_deref(),
        Some("go1.22.3")
    );
    assert_eq!(
        editor.read_active(&node).expect("read works").as_deref(),
        Some("v20.11.1")
    );
}

#[test]
fn concurrent_edits_from_clones_are_serialized() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = Arc::new(FileStore::new(temp.path().join("path")));
    let editor = PathEditor::new(store.clone());
    let root = temp.path().join("packages");

    let handles: Vec<_> = ["alpha", "beta", "gamma", "delta"]
        .into_iter()
        .map(|runtime| {
            let editor = editor.clone();
            let runtime_root = root.join(runtime);
            std::thread::spawn(move || {
                let signature = PathSignature::new(runtime, "bin", &runtime_root);
                for version in ["1.0.0", "2.0.0"] {
                    editor
                        .add(&signature, &runtime_root.join(version).join("bin"))
                        .expect("edit succeeds");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("editor thread should not panic");
    }

    let value = store
        .read_user_path()
        .expect("store readable")
        .unwrap_or_default();
    let segments: Vec<&str> = value.split(PATH_SEPARATOR).collect();
    assert_eq!(segments.len(), 4, "no edit may be lost: {value}");
    assert!(
        segments
            .iter()
            .all(|segment| Path::new(segment).ends_with(Path::new("2.0.0").join("bin")))
    );
}
