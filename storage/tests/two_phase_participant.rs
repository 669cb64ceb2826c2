//! Exercises a single Storage node as a two-phase participant, without a
//! Manager in the loop — `MaPut`/`MaDel`/`Commit`/`Abort` are the calls a
//! real Manager would drive (spec §4.3, §8 P6/P7).

use rpc::proto::StorageService;
use storage::StorageNode;

fn node(cache_capacity: usize) -> StorageNode {
    let data_dir = tempfile::tempdir().unwrap().into_path();
    StorageNode::new(1, data_dir, "127.0.0.1:1".to_string(), cache_capacity)
}

#[async_std::test]
async fn prepare_then_commit_persists_value() {
    let node = node(5);

    node.ma_put("k".to_string(), b"v1".to_vec()).await.unwrap();
    node.commit("k".to_string(), false).await.unwrap();

    assert_eq!(node.ma_get("k".to_string()).await.unwrap(), b"v1");
}

#[async_std::test]
async fn prepare_then_abort_discards_new_key() {
    let node = node(5);

    node.ma_put("k".to_string(), b"v1".to_vec()).await.unwrap();
    node.abort("k".to_string()).await.unwrap();

    // The key never existed before this prepare, so abort should leave
    // it absent rather than rolling forward.
    assert_eq!(node.ma_get("k".to_string()).await, Err("服务器中无键值".to_string()));
}

#[async_std::test]
async fn prepare_then_abort_restores_previous_value() {
    let node = node(5);

    node.ma_put("k".to_string(), b"v1".to_vec()).await.unwrap();
    node.commit("k".to_string(), false).await.unwrap();

    node.ma_put("k".to_string(), b"v2".to_vec()).await.unwrap();
    node.abort("k".to_string()).await.unwrap();

    assert_eq!(node.ma_get("k".to_string()).await.unwrap(), b"v1");
}

#[async_std::test]
async fn ma_get_reports_busy_while_prepare_holds_the_writer_lock() {
    let node = node(5);
    node.ma_put("k".to_string(), b"v1".to_vec()).await.unwrap();
    node.commit("k".to_string(), false).await.unwrap();

    // Start a second prepare on the same key but don't commit/abort yet:
    // the writer lock stays held.
    node.ma_put("k".to_string(), b"v2".to_vec()).await.unwrap();

    assert_eq!(node.ma_get("k".to_string()).await, Err("无法获取锁".to_string()));

    node.commit("k".to_string(), false).await.unwrap();
    assert_eq!(node.ma_get("k".to_string()).await.unwrap(), b"v2");
}

#[async_std::test]
async fn delete_commit_removes_key() {
    let node = node(5);

    node.ma_put("k".to_string(), b"v1".to_vec()).await.unwrap();
    node.commit("k".to_string(), false).await.unwrap();

    node.ma_del("k".to_string()).await.unwrap();
    node.commit("k".to_string(), true).await.unwrap();

    assert_eq!(node.ma_get("k".to_string()).await, Err("服务器中无键值".to_string()));
}
