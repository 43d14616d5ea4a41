use grfserve_archive::mock::write_stub_archive;
use grfserve_archive::{ArchiveRegistry, MemoryEngineFactory, SUPPORTED_VERSION};
use grfserve_core::{ClientContext, CoreError, ResolvedSource, ServerConfig};
use std::path::Path;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

fn context(root: &Path, archives: &[&str], factory: &MemoryEngineFactory) -> ClientContext {
    context_with(ServerConfig::with_root(root), archives, factory)
}

fn context_with(config: ServerConfig, archives: &[&str], factory: &MemoryEngineFactory) -> ClientContext {
    let resources = config.resources_path();
    for a in archives {
        write_stub_archive(&resources.join(a), SUPPORTED_VERSION, [0; 14]).unwrap();
    }
    let registry = ArchiveRegistry::open(&resources, &names(archives), factory);
    ClientContext::with_registry(config, registry)
}

#[test]
fn overlay_takes_precedence_over_archives() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data").join("clientinfo.xml"), b"local").unwrap();
    let factory = MemoryEngineFactory::new().with_entry("data.grf", "data\\clientinfo.xml", b"packed");
    let ctx = context(dir.path(), &["data.grf"], &factory);

    let file = ctx.resolver().resolve("data/clientinfo.xml").unwrap().unwrap();
    assert_eq!(file.bytes, b"local");
    assert_eq!(file.source, ResolvedSource::Overlay);
    assert_eq!(factory.lookups("data.grf"), 0);
}

#[test]
fn higher_priority_archive_wins() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new()
        .with_entry("patch.grf", "data\\a.txt", b"patched")
        .with_entry("data.grf", "data\\a.txt", b"original");
    let ctx = context(dir.path(), &["patch.grf", "data.grf"], &factory);

    let file = ctx.resolver().resolve("data/a.txt").unwrap().unwrap();
    assert_eq!(file.bytes, b"patched");
    assert_eq!(file.source, ResolvedSource::Archive("patch.grf".to_owned()));
}

#[test]
fn archive_hit_is_written_back_once() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new().with_entry("data.grf", "data\\sprite\\x.spr", b"spr");
    let ctx = context(dir.path(), &["data.grf"], &factory);

    let first = ctx.resolver().get_file("data/sprite/x.spr").unwrap().unwrap();
    assert_eq!(first, b"spr");
    assert_eq!(factory.lookups("data.grf"), 1);
    assert_eq!(
        std::fs::read(dir.path().join("data").join("sprite").join("x.spr")).unwrap(),
        b"spr"
    );

    let second = ctx.resolver().resolve("data/sprite/x.spr").unwrap().unwrap();
    assert_eq!(second.bytes, first);
    assert_eq!(second.source, ResolvedSource::Overlay);
    assert_eq!(factory.lookups("data.grf"), 1);
}

#[test]
fn write_back_disabled_leaves_overlay_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::with_root(dir.path());
    config.auto_extract = false;
    let factory = MemoryEngineFactory::new().with_entry("data.grf", "data\\a.txt", b"a");
    let ctx = context_with(config, &["data.grf"], &factory);

    assert!(ctx.resolver().get_file("data/a.txt").unwrap().is_some());
    assert!(!dir.path().join("data").join("a.txt").exists());
    ctx.resolver().get_file("data/a.txt").unwrap();
    assert_eq!(factory.lookups("data.grf"), 2);
}

#[test]
fn failed_write_back_still_returns_content() {
    let dir = tempfile::tempdir().unwrap();
    // A file where the overlay needs a directory makes the write fail.
    std::fs::write(dir.path().join("data"), b"not a dir").unwrap();
    let factory = MemoryEngineFactory::new().with_entry("data.grf", "data\\a.txt", b"a");
    let ctx = context(dir.path(), &["data.grf"], &factory);

    assert_eq!(ctx.resolver().get_file("data/a.txt").unwrap().unwrap(), b"a");
}

#[test]
fn backslash_requests_resolve_like_forward_slash() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::with_root(dir.path());
    config.auto_extract = false;
    let factory = MemoryEngineFactory::new().with_entry("data.grf", "data\\texture\\t.bmp", b"bmp");
    let ctx = context_with(config, &["data.grf"], &factory);

    assert_eq!(
        ctx.resolver().get_file("data\\texture\\t.bmp").unwrap().unwrap(),
        b"bmp"
    );
    assert_eq!(
        ctx.resolver().get_file("/data//texture/t.bmp").unwrap().unwrap(),
        b"bmp"
    );
}

#[test]
fn listing_is_deduplicated_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new()
        .with_entry("a.grf", "data\\b.txt", b"1")
        .with_entry("a.grf", "data\\shared.txt", b"1")
        .with_entry("b.grf", "data\\shared.txt", b"2")
        .with_entry("b.grf", "data\\a.txt", b"2");
    let ctx = context(dir.path(), &["a.grf", "b.grf"], &factory);

    assert_eq!(
        ctx.resolver().list_files(),
        vec!["data\\a.txt", "data\\b.txt", "data\\shared.txt"]
    );
}

#[test]
fn search_is_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new()
        .with_entry("a.grf", "data\\sprite\\Poring.spr", b"1")
        .with_entry("a.grf", "data\\sprite\\poring.act", b"1")
        .with_entry("a.grf", "data\\map.gat", b"1");
    let ctx = context(dir.path(), &["a.grf"], &factory);

    let hits = ctx.resolver().search("PORING\\.(spr|act)$").unwrap();
    assert_eq!(
        hits,
        vec!["data\\sprite\\Poring.spr", "data\\sprite\\poring.act"]
    );
}

#[test]
fn search_matches_backslash_separated_names() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new()
        .with_entry("a.grf", "data\\sprite\\poring.spr", b"1")
        .with_entry("a.grf", "data\\texture\\sprite.bmp", b"1");
    let ctx = context(dir.path(), &["a.grf"], &factory);

    assert_eq!(
        ctx.resolver().list_files(),
        vec!["data\\sprite\\poring.spr", "data\\texture\\sprite.bmp"]
    );
    let hits = ctx.resolver().search(r"data\\sprite\\").unwrap();
    assert_eq!(hits, vec!["data\\sprite\\poring.spr"]);
}

#[test]
fn concurrent_write_back_of_one_path_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new().with_entry("data.grf", "data\\x", b"shared content");
    let ctx = context(dir.path(), &["data.grf"], &factory);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| ctx.resolver().get_file("data/x")))
            .collect();
        for handle in handles {
            let bytes = handle.join().unwrap().unwrap().unwrap();
            assert_eq!(bytes, b"shared content");
        }
    });

    let names: Vec<_> = std::fs::read_dir(dir.path().join("data"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["x"]);
    assert_eq!(
        std::fs::read(dir.path().join("data").join("x")).unwrap(),
        b"shared content"
    );
}

#[test]
fn disabled_search_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::with_root(dir.path());
    config.enable_search = false;
    let factory = MemoryEngineFactory::new().with_entry("a.grf", "data\\a.txt", b"1");
    let ctx = context_with(config, &["a.grf"], &factory);

    assert!(ctx.resolver().search(".*").unwrap().is_empty());
}

#[test]
fn traversal_never_touches_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new().with_archive("a.grf");
    let ctx = context(dir.path(), &["a.grf"], &factory);

    for raw in ["../etc/passwd", "data/../../x", "data\\..\\x", "./a"] {
        assert!(matches!(
            ctx.resolver().get_file(raw),
            Err(CoreError::Path(_))
        ));
    }
}

#[test]
fn missing_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryEngineFactory::new().with_entry("a.grf", "data\\a.txt", b"1");
    let ctx = context(dir.path(), &["a.grf"], &factory);
    assert!(ctx.resolver().resolve("data/none.txt").unwrap().is_none());
}
