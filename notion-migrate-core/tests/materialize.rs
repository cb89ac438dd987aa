use notion_migrate_core::blocks::{count_blocks, BlockKind, BlockNode, TextRun};
use notion_migrate_core::client::DestinationClient;
use notion_migrate_core::contract::MockDocumentApi;
use notion_migrate_core::error::RemoteError;
use notion_migrate_core::materialize::Materializer;
use notion_migrate_core::policy::FailurePolicy;
use notion_migrate_core::scheduler::{Scheduler, SchedulerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Calls = Arc<Mutex<Vec<(String, Vec<BlockNode>)>>>;

fn item(text: &str, children: Vec<BlockNode>) -> BlockNode {
    BlockNode::with_children(
        BlockKind::BulletedListItem {
            text: vec![TextRun::plain(text)],
        },
        children,
    )
}

/// A mock recording every append and answering with fresh block ids.
fn recording_api(calls: &Calls) -> MockDocumentApi {
    let calls = Arc::clone(calls);
    let next_id = Arc::new(AtomicUsize::new(0));
    let mut api = MockDocumentApi::new();
    api.expect_append_children()
        .returning(move |block_id: &str, blocks: Vec<BlockNode>| {
            let ids = blocks
                .iter()
                .map(|_| format!("blk-{}", next_id.fetch_add(1, Ordering::SeqCst)))
                .collect();
            calls.lock().unwrap().push((block_id.to_string(), blocks));
            Ok(ids)
        });
    api
}

fn client(api: MockDocumentApi) -> DestinationClient<MockDocumentApi> {
    DestinationClient::new(api, Scheduler::new(SchedulerConfig::default()))
}

#[tokio::test]
async fn flat_documents_are_chunked_by_the_batch_limit() {
    let calls: Calls = Arc::default();
    let client = client(recording_api(&calls));
    let policy = FailurePolicy::no_retry();
    let blocks: Vec<BlockNode> = (0..250)
        .map(|i| BlockNode::paragraph(format!("p{i}")))
        .collect();

    let report = Materializer::new(&client, &policy)
        .materialize(blocks.clone(), "root", None)
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3, "ceil(250 / 100) calls");
    assert!(calls.iter().all(|(target, _)| target == "root"));
    let sizes: Vec<usize> = calls.iter().map(|(_, batch)| batch.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    let written: Vec<BlockNode> = calls.iter().flat_map(|(_, b)| b.clone()).collect();
    assert_eq!(written, blocks, "document order is preserved");
    assert_eq!(report.calls, 3);
    assert_eq!(report.blocks_written, 250);
    assert_eq!(report.failed_calls, 0);
}

#[tokio::test]
async fn two_levels_of_nesting_travel_in_one_call() {
    let calls: Calls = Arc::default();
    let client = client(recording_api(&calls));
    let policy = FailurePolicy::no_retry();
    let blocks = vec![
        item("parent", vec![item("child", vec![])]),
        BlockNode::paragraph("after"),
    ];

    Materializer::new(&client, &policy)
        .materialize(blocks.clone(), "root", None)
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("root".to_string(), blocks));
}

#[tokio::test]
async fn deeper_blocks_are_written_parent_first_under_the_returned_id() {
    let calls: Calls = Arc::default();
    let client = client(recording_api(&calls));
    let policy = FailurePolicy::no_retry();
    let grandchild = item("grandchild", vec![]);
    let child = item("child", vec![grandchild]);
    let top = item("top", vec![child.clone()]);
    let blocks = vec![
        BlockNode::paragraph("before"),
        top.clone(),
        BlockNode::paragraph("after"),
    ];

    let report = Materializer::new(&client, &policy)
        .materialize(blocks, "root", None)
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            ("root".to_string(), vec![BlockNode::paragraph("before")]),
            ("root".to_string(), vec![top.without_children()]),
            // "before" got blk-0, the bare top item blk-1.
            ("blk-1".to_string(), vec![child]),
            ("root".to_string(), vec![BlockNode::paragraph("after")]),
        ]
    );
    assert_eq!(report.calls, 4);
    assert_eq!(report.skipped_subtrees, 0);
}

#[tokio::test]
async fn tables_keep_their_rows_attached() {
    let calls: Calls = Arc::default();
    let client = client(recording_api(&calls));
    let policy = FailurePolicy::no_retry();
    let rows = (0..3)
        .map(|i| {
            BlockNode::new(BlockKind::TableRow {
                cells: vec![vec![TextRun::plain(format!("r{i}"))]],
            })
        })
        .collect();
    let table = BlockNode::with_children(
        BlockKind::Table {
            width: 1,
            has_column_header: true,
        },
        rows,
    );

    Materializer::new(&client, &policy)
        .materialize(vec![table.clone()], "root", None)
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, vec![table]);
}

#[tokio::test]
async fn long_tables_are_created_then_extended_in_row_batches() {
    let calls: Calls = Arc::default();
    let client = client(recording_api(&calls));
    let policy = FailurePolicy::no_retry();
    let rows: Vec<BlockNode> = (0..150)
        .map(|i| {
            BlockNode::new(BlockKind::TableRow {
                cells: vec![vec![TextRun::plain(format!("r{i}"))]],
            })
        })
        .collect();
    let table = BlockNode::with_children(
        BlockKind::Table {
            width: 1,
            has_column_header: false,
        },
        rows.clone(),
    );

    let report = Materializer::new(&client, &policy)
        .materialize(vec![table], "root", None)
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "root");
    assert_eq!(calls[0].1.len(), 1);
    assert!(calls[0].1[0].is_table());
    assert_eq!(calls[0].1[0].children, rows[..100].to_vec());
    assert_eq!(calls[1].0, "blk-0", "remaining rows go under the table id");
    assert_eq!(calls[1].1, rows[100..].to_vec());
    assert_eq!(report.failed_calls, 0);
}

#[tokio::test]
async fn batches_respect_the_total_block_limit() {
    let calls: Calls = Arc::default();
    let client = client(recording_api(&calls));
    let policy = FailurePolicy::no_retry();
    let blocks: Vec<BlockNode> = (0..100)
        .map(|i| {
            let children = (0..20).map(|j| item(&format!("{i}.{j}"), vec![])).collect();
            item(&format!("{i}"), children)
        })
        .collect();

    Materializer::new(&client, &policy)
        .materialize(blocks.clone(), "root", None)
        .await;

    let calls = calls.lock().unwrap();
    let sizes: Vec<usize> = calls.iter().map(|(_, batch)| batch.len()).collect();
    assert_eq!(sizes, vec![47, 47, 6], "21 blocks per item, at most 1000 per call");
    assert!(calls
        .iter()
        .all(|(_, batch)| count_blocks(batch) <= client.block_limit()));
    let written: Vec<BlockNode> = calls.iter().flat_map(|(_, b)| b.clone()).collect();
    assert_eq!(written, blocks);
}

#[tokio::test]
async fn oversized_child_lists_get_their_own_calls() {
    let calls: Calls = Arc::default();
    let client = client(recording_api(&calls));
    let policy = FailurePolicy::no_retry();
    let children: Vec<BlockNode> = (0..150).map(|i| item(&format!("c{i}"), vec![])).collect();
    let parent = item("parent", children);

    let report = Materializer::new(&client, &policy)
        .materialize(vec![parent], "root", None)
        .await;

    let calls = calls.lock().unwrap();
    let shape: Vec<(&str, usize)> = calls
        .iter()
        .map(|(target, batch)| (target.as_str(), batch.len()))
        .collect();
    assert_eq!(shape, vec![("root", 1), ("blk-0", 100), ("blk-0", 50)]);
    assert_eq!(report.blocks_written, 151);
}

#[tokio::test]
async fn a_failed_parent_skips_its_subtree_but_not_its_siblings() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let calls: Calls = Arc::default();
    let mut api = MockDocumentApi::new();
    {
        let attempts = Arc::clone(&attempts);
        let calls = Arc::clone(&calls);
        api.expect_append_children()
            .returning(move |block_id: &str, blocks: Vec<BlockNode>| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                calls.lock().unwrap().push((block_id.to_string(), blocks.clone()));
                if n == 0 {
                    Err(RemoteError::Status {
                        status: 400,
                        code: "validation_error".into(),
                        message: "bad block".into(),
                    })
                } else {
                    Ok(blocks.iter().map(|_| format!("ok-{n}")).collect())
                }
            });
    }
    let client = client(api);
    let policy = FailurePolicy::no_retry();
    let deep = item("top", vec![item("child", vec![item("grandchild", vec![])])]);
    let blocks = vec![deep, BlockNode::paragraph("sibling")];

    let report = Materializer::new(&client, &policy)
        .materialize(blocks, "root", None)
        .await;

    assert_eq!(report.failed_calls, 1);
    assert_eq!(report.skipped_subtrees, 1);
    assert_eq!(report.calls, 1);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], ("root".to_string(), vec![BlockNode::paragraph("sibling")]));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_before_giving_up() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut api = MockDocumentApi::new();
    {
        let attempts = Arc::clone(&attempts);
        api.expect_append_children()
            .returning(move |_: &str, blocks: Vec<BlockNode>| {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RemoteError::Status {
                        status: 429,
                        code: "rate_limited".into(),
                        message: "slow down".into(),
                    })
                } else {
                    Ok(blocks.iter().map(|_| "id".to_string()).collect())
                }
            });
    }
    let client = client(api);
    let policy = FailurePolicy::default();

    let report = Materializer::new(&client, &policy)
        .materialize(vec![BlockNode::paragraph("hello")], "root", None)
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(report.calls, 1);
    assert_eq!(report.failed_calls, 0);
}

#[tokio::test]
async fn empty_documents_issue_no_calls() {
    let mut api = MockDocumentApi::new();
    api.expect_append_children().never();
    let client = client(api);
    let policy = FailurePolicy::no_retry();

    let report = Materializer::new(&client, &policy)
        .materialize(Vec::new(), "root", None)
        .await;

    assert_eq!(report.calls, 0);
}
