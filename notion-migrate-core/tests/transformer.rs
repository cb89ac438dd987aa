use notion_migrate_core::assets::DisabledAssetStore;
use notion_migrate_core::blocks::{BlockKind, BlockNode, TextRun};
use notion_migrate_core::contract::{AssetRef, MarkdownParser, MockAssetStore};
use notion_migrate_core::error::{AssetError, ParseError};
use notion_migrate_core::location::{Location, LocationMap};
use notion_migrate_core::parse::CommonMarkParser;
use notion_migrate_core::transform::{TransformConfig, Transformer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const PAGE: &str = "Intro\n\n![diagram](/uploads/pic.png)\n\nSee [other](./other)\n\n:::tip Remember\nbody\n:::\n";

struct Export {
    _dir: TempDir,
    root: PathBuf,
    page: PathBuf,
}

fn export() -> Export {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::create_dir_all(root.join("uploads")).unwrap();
    fs::write(root.join("uploads/pic.png"), b"\x89PNG").unwrap();
    let page = root.join("docs/page.md");
    fs::write(&page, PAGE).unwrap();
    Export {
        _dir: dir,
        root,
        page,
    }
}

fn map_with_other(root: &Path) -> LocationMap {
    LocationMap::from_entries(vec![(
        root.join("docs/other.md"),
        Location {
            destination_id: "other-id".into(),
            title: "other".into(),
            url: "https://www.notion.so/other".into(),
        },
    )])
}

fn transformer(store: MockAssetStore, root: &Path) -> Transformer {
    Transformer::new(
        Arc::new(CommonMarkParser),
        Arc::new(store),
        root,
        TransformConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn a_document_goes_through_every_pass() {
    let export = export();
    let mut store = MockAssetStore::new();
    store
        .expect_upload_file()
        .withf(|asset: &AssetRef| asset.relative_path == "uploads/pic.png")
        .times(1)
        .returning(|_: &AssetRef| Ok("https://cdn.example.com/pic.png".to_string()));

    let output = transformer(store, &export.root)
        .transform(PAGE, &export.page, &map_with_other(&export.root))
        .await;

    assert_eq!(
        output.blocks,
        vec![
            BlockNode::paragraph("Intro"),
            BlockNode::new(BlockKind::Image {
                url: "https://cdn.example.com/pic.png".into(),
                caption: vec![TextRun::plain("diagram")],
            }),
            BlockNode::new(BlockKind::Paragraph {
                text: vec![
                    TextRun::plain("See "),
                    TextRun {
                        content: "other".into(),
                        link: Some("https://www.notion.so/other".into()),
                        ..TextRun::default()
                    },
                ],
            }),
            BlockNode::with_children(
                BlockKind::Callout {
                    text: vec![TextRun::plain("Remember")],
                    icon: "💡".into(),
                    color: "yellow_background".into(),
                },
                vec![BlockNode::paragraph("body")],
            ),
        ]
    );
    assert_eq!(output.stats.assets_rehomed, 1);
    assert_eq!(output.stats.links_resolved, 1);
    assert_eq!(output.stats.links_unresolved, 0);
    assert!(!output.stats.fallback);
}

#[tokio::test]
async fn a_rejected_upload_keeps_the_reference_as_text() {
    let export = export();
    let mut store = MockAssetStore::new();
    store.expect_upload_file().returning(|asset: &AssetRef| {
        Err(AssetError::Rejected {
            key: asset.relative_path.clone(),
            status: 403,
        })
    });

    let output = transformer(store, &export.root)
        .transform(PAGE, &export.page, &map_with_other(&export.root))
        .await;

    assert_eq!(output.stats.assets_failed, 1);
    assert_eq!(
        output.blocks[1],
        BlockNode::paragraph("diagram (/uploads/pic.png)"),
        "an image without a usable URL degrades to a paragraph"
    );
}

#[tokio::test]
async fn attachment_links_survive_a_store_that_refuses_them() {
    let export = export();
    fs::write(export.root.join("uploads/handbook.pdf"), b"%PDF").unwrap();
    let transformer = Transformer::new(
        Arc::new(CommonMarkParser),
        Arc::new(DisabledAssetStore),
        &export.root,
        TransformConfig::default(),
    )
    .unwrap();

    let output = transformer
        .transform(
            "See [the handbook](/uploads/handbook.pdf)",
            &export.page,
            &map_with_other(&export.root),
        )
        .await;

    assert_eq!(output.stats.assets_failed, 1);
    assert_eq!(output.stats.links_unresolved, 0);
    assert_eq!(output.blocks.len(), 1);
    let text = output.blocks[0].paragraph_text().unwrap();
    assert_eq!(text, "See the handbook");
    assert!(!text.contains("could not be rebuilt"));
}

#[tokio::test]
async fn missing_attachments_never_reach_the_store() {
    let export = export();
    fs::remove_file(export.root.join("uploads/pic.png")).unwrap();
    let mut store = MockAssetStore::new();
    store.expect_upload_file().never();

    let output = transformer(store, &export.root)
        .transform(PAGE, &export.page, &LocationMap::default())
        .await;

    assert_eq!(output.stats.assets_failed, 1);
    assert_eq!(output.stats.links_unresolved, 1);
}

#[tokio::test]
async fn attachments_next_to_the_document_win_over_the_root() {
    let export = export();
    fs::create_dir_all(export.root.join("docs/uploads")).unwrap();
    fs::write(export.root.join("docs/uploads/pic.png"), b"local").unwrap();
    let mut store = MockAssetStore::new();
    store
        .expect_upload_file()
        .withf(|asset: &AssetRef| asset.relative_path == "docs/uploads/pic.png")
        .times(1)
        .returning(|_: &AssetRef| Ok("https://cdn.example.com/local.png".to_string()));

    let output = transformer(store, &export.root)
        .transform(
            "![x](uploads/pic.png)",
            &export.page,
            &LocationMap::default(),
        )
        .await;

    assert_eq!(output.stats.assets_rehomed, 1);
}

struct RejectingParser;

impl MarkdownParser for RejectingParser {
    fn parse(&self, _markdown: &str) -> Result<Vec<BlockNode>, ParseError> {
        Err(ParseError("unbalanced input".into()))
    }
}

#[tokio::test]
async fn parser_failures_produce_a_stub_document() {
    let export = export();
    let mut store = MockAssetStore::new();
    store
        .expect_upload_file()
        .returning(|_: &AssetRef| Ok("https://cdn.example.com/pic.png".to_string()));
    let transformer = Transformer::new(
        Arc::new(RejectingParser),
        Arc::new(store),
        &export.root,
        TransformConfig::default(),
    )
    .unwrap();

    let output = transformer
        .transform(PAGE, &export.page, &LocationMap::default())
        .await;

    assert!(output.stats.fallback);
    assert_eq!(
        output.blocks,
        vec![BlockNode::paragraph(
            "Error converting content: unbalanced input"
        )]
    );
}

#[tokio::test]
async fn password_lines_are_counted_but_kept() {
    let export = export();
    let transformer = transformer(MockAssetStore::new(), &export.root);

    let output = transformer
        .transform(
            "wifi password: hunter2",
            &export.page,
            &LocationMap::default(),
        )
        .await;

    assert_eq!(output.stats.password_warnings, 1);
    assert_eq!(
        output.blocks,
        vec![BlockNode::paragraph("wifi password: hunter2")]
    );
}
