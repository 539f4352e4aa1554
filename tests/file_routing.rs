use std::{sync::Arc, time::Duration};

use courier::{Context, FileComponent, MemoryComponent, Value, keys};
use tempfile::tempdir;

async fn context() -> (Context, Arc<MemoryComponent>) {
    let ctx = Context::new();
    let memory = Arc::new(MemoryComponent::new());
    ctx.add_component("mem", memory.clone()).await;
    ctx.add_component("file", Arc::new(FileComponent::new())).await;
    (ctx, memory)
}

#[tokio::test]
async fn test_single_file_is_routed_on_start() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("order.txt");
    let target = dir.path().join("out/order-copy.txt");
    std::fs::write(&source, "order #1").unwrap();

    let (ctx, _memory) = context().await;
    ctx.create_route_builder()
        .set_id("copy")
        .from(&format!("file:{}", source.display()))
        .await
        .unwrap()
        .to(&format!("file:{}", target.display()))
        .await
        .unwrap();

    ctx.start().await.unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "order #1");
    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_directory_watch_emits_new_files() {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::create_dir_all(&staging).unwrap();

    let (ctx, memory) = context().await;
    ctx.create_route_builder()
        .set_id("inbox")
        .from(&format!("file://{}", inbox.display()))
        .await
        .unwrap()
        .to("mem:files")
        .await
        .unwrap();
    ctx.start().await.unwrap();

    // give the watcher a moment to register before the file arrives
    tokio::time::sleep(Duration::from_millis(100)).await;
    let staged = staging.join("report.csv");
    std::fs::write(&staged, "a,b,c").unwrap();
    std::fs::rename(&staged, inbox.join("report.csv")).unwrap();

    let files = memory.queue("files");
    for _ in 0..300 {
        if !files.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let ex = files.pop().expect("file picked up");
    assert_eq!(
        ex.header(keys::FILE_NAME).and_then(Value::as_str),
        Some("report.csv")
    );
    assert_eq!(ex.body().as_bytes().map(|b| b.to_vec()), Some(b"a,b,c".to_vec()));

    ctx.stop().await.unwrap();
}
