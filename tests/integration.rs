// tests/integration.rs
// End-to-end coverage: accessibility window -> parser -> ingestion ->
// store -> query, exercised the way a real harvester run would rather
// than unit-by-unit. Per-module edge cases already have their own
// #[cfg(test)] coverage; this file is for the seams between modules.

use std::sync::Arc;

use chrono::{Local, TimeZone};

use slunk::accessibility::{Element, MockElement};
use slunk::db::pool::DatabasePool;
use slunk::db::search::StructuredFilter;
use slunk::deadline::Deadline;
use slunk::embeddings::EmbeddingClient;
use slunk::hashstore::HashStore;
use slunk::ingestion::IngestionPipeline;
use slunk::parsers::{AppKind, ChannelType, ParserRegistry};
use slunk::query::QueryEngine;

async fn harness() -> (Arc<DatabasePool>, Arc<EmbeddingClient>) {
    let pool = Arc::new(DatabasePool::open_in_memory().await.unwrap());
    let embeddings = Arc::new(EmbeddingClient::deterministic());
    (pool, embeddings)
}

fn slack_window(
    channel: &str,
    date_label: &str,
    messages: &[(&str, &str, &str)],
) -> slunk::accessibility::ElementHandle {
    let mut window = MockElement::leaf()
        .child(MockElement::leaf().attribute("data-qa", "channel_name").value(channel).build())
        .child(MockElement::leaf().attribute("data-qa", "sticky_date_divider").value(date_label).build());

    for (sender, ts_label, content) in messages {
        window = window.child(
            MockElement::leaf()
                .attribute("data-qa", "virtual-list-item")
                .child(MockElement::leaf().attribute("data-qa", "message_sender").value(*sender).build())
                .child(
                    MockElement::leaf()
                        .attribute("data-qa", "message_timestamp")
                        .attribute("data-ts-label", *ts_label)
                        .build(),
                )
                .child(MockElement::leaf().attribute("data-qa", "message_content").value(*content).build())
                .build(),
        );
    }
    window.build()
}

/// S1: a fresh Slack channel window parses, ingests, and becomes
/// searchable by both keyword and hybrid (semantic + keyword) search.
#[tokio::test]
async fn slack_window_parses_ingests_and_is_searchable() {
    let window = slack_window(
        "#general",
        "March 3rd, 2023",
        &[("alice", "2:41 PM", "let's deploy the service today"), ("alice", "2:42 PM", "sounds good to me")],
    );

    let registry = ParserRegistry::new();
    let parsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    assert_eq!(parsed.conversations.len(), 1);
    assert_eq!(parsed.message_count(), 2);

    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool.clone(), embeddings.clone());
    let result = pipeline.ingest_conversation("session-1", "Acme", &parsed.conversations[0]).await.unwrap();
    assert_eq!(result.new_messages, 2);

    let engine = QueryEngine::new(pool, embeddings);
    let keyword_hits = engine.keyword_search("deploy", 10).await.unwrap();
    assert_eq!(keyword_hits.len(), 1);
    assert_eq!(keyword_hits[0].sender, "alice");

    let hybrid_hits = engine.hybrid_search("deploy the service", StructuredFilter::default(), 10).await.unwrap();
    assert!(!hybrid_hits.is_empty());
}

/// S2/S3: re-parsing and re-ingesting the identical window is a no-op
/// the second time through (every message classifies DUPLICATE).
#[tokio::test]
async fn reingesting_an_unchanged_window_yields_all_duplicates() {
    let window = slack_window("#general", "March 3rd, 2023", &[("alice", "2:41 PM", "hello there")]);
    let registry = ParserRegistry::new();
    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool, embeddings);

    let parsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    let first = pipeline.ingest_conversation("s1", "Acme", &parsed.conversations[0]).await.unwrap();
    assert_eq!(first.new_messages, 1);

    let reparsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    let second = pipeline.ingest_conversation("s1", "Acme", &reparsed.conversations[0]).await.unwrap();
    assert_eq!(second.duplicate_messages, 1);
    assert_eq!(second.new_messages, 0);
}

/// A re-render where only the message body changed is an UPDATE and
/// bumps `version`; the new content is what search then returns.
#[tokio::test]
async fn edited_message_reparse_updates_content_and_bumps_version() {
    let registry = ParserRegistry::new();
    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool.clone(), embeddings.clone());

    let original = slack_window("#general", "March 3rd, 2023", &[("alice", "2:41 PM", "hello there")]);
    let parsed = registry.parse(AppKind::Slack, &original, Deadline::never()).await.unwrap();
    pipeline.ingest_conversation("s1", "Acme", &parsed.conversations[0]).await.unwrap();

    let edited = slack_window("#general", "March 3rd, 2023", &[("alice", "2:41 PM", "hello there, edited")]);
    let reparsed = registry.parse(AppKind::Slack, &edited, Deadline::never()).await.unwrap();
    let result = pipeline.ingest_conversation("s1", "Acme", &reparsed.conversations[0]).await.unwrap();
    assert_eq!(result.updated_messages, 1);

    let engine = QueryEngine::new(pool, embeddings);
    let hits = engine.keyword_search("edited", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].version, 2);
}

/// A re-render where only a reaction pill appeared is REACTIONS_UPDATED,
/// not NEW and not a content UPDATE.
#[tokio::test]
async fn reaction_appearing_on_reparse_is_reactions_updated() {
    let no_reaction = MockElement::leaf()
        .child(MockElement::leaf().attribute("data-qa", "channel_name").value("#general").build())
        .child(
            MockElement::leaf()
                .attribute("data-qa", "virtual-list-item")
                .child(MockElement::leaf().attribute("data-qa", "message_sender").value("alice").build())
                .child(
                    MockElement::leaf()
                        .attribute("data-qa", "message_timestamp")
                        .attribute("data-ts-label", "2:41 PM")
                        .build(),
                )
                .child(MockElement::leaf().attribute("data-qa", "message_content").value("nice work").build())
                .build(),
        )
        .build();
    let with_reaction = MockElement::leaf()
        .child(MockElement::leaf().attribute("data-qa", "channel_name").value("#general").build())
        .child(
            MockElement::leaf()
                .attribute("data-qa", "virtual-list-item")
                .child(MockElement::leaf().attribute("data-qa", "message_sender").value("alice").build())
                .child(
                    MockElement::leaf()
                        .attribute("data-qa", "message_timestamp")
                        .attribute("data-ts-label", "2:41 PM")
                        .build(),
                )
                .child(MockElement::leaf().attribute("data-qa", "message_content").value("nice work").build())
                .child(MockElement::leaf().attribute("data-qa", "reaction_pill").description("👍 1").build())
                .build(),
        )
        .build();

    let registry = ParserRegistry::new();
    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool, embeddings);

    let parsed = registry.parse(AppKind::Slack, &no_reaction, Deadline::never()).await.unwrap();
    pipeline.ingest_conversation("s1", "Acme", &parsed.conversations[0]).await.unwrap();

    let reparsed = registry.parse(AppKind::Slack, &with_reaction, Deadline::never()).await.unwrap();
    let result = pipeline.ingest_conversation("s1", "Acme", &reparsed.conversations[0]).await.unwrap();
    assert_eq!(result.reactions_updated_messages, 1);
    assert_eq!(result.updated_messages, 1);
    assert_eq!(result.new_messages, 0);
}

/// S4: a Slack threads view splits into one ConversationRecord per
/// thread, each of which ingests and is independently queryable.
#[tokio::test]
async fn slack_threads_view_ingests_each_thread_as_its_own_channel() {
    let heading = |channel: &str, with: &str| {
        MockElement::leaf()
            .id("threads_view_heading")
            .child(MockElement::leaf().value(channel).build())
            .child(MockElement::leaf().value(with).build())
            .build()
    };
    let footer = || MockElement::leaf().id("threads_view_footer").build();
    let thread_message = |sender: &str, ts: &str, content: &str| {
        MockElement::leaf()
            .attribute("data-qa", "virtual-list-item")
            .child(MockElement::leaf().attribute("data-qa", "message_sender").value(sender).build())
            .child(MockElement::leaf().attribute("data-qa", "message_timestamp").attribute("data-ts-label", ts).build())
            .child(MockElement::leaf().attribute("data-qa", "message_content").value(content).build())
            .build()
    };

    let content_list = MockElement::leaf()
        .subrole("content-list")
        .child(heading("#bugs", "@bob, @carol"))
        .child(thread_message("alice", "2:41 PM", "found a crash"))
        .child(thread_message("bob", "2:42 PM", "looking into it"))
        .child(footer())
        .child(heading("#infra", ""))
        .child(thread_message("dave", "2:43 PM", "deploy is stuck"))
        .child(footer())
        .build();

    let window = MockElement::leaf()
        .child(MockElement::leaf().attribute("data-qa", "channel_name").value("Threads").build())
        .child(
            MockElement::leaf()
                .attribute("data-qa", "view_contents_primary")
                .description("Threads")
                .build(),
        )
        .child(content_list)
        .build();

    let registry = ParserRegistry::new();
    let parsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    assert_eq!(parsed.conversations.len(), 2);

    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool.clone(), embeddings.clone());
    for conversation in &parsed.conversations {
        assert_eq!(conversation.channel_type, ChannelType::Thread);
        pipeline.ingest_conversation("s1", "Acme", conversation).await.unwrap();
    }

    let engine = QueryEngine::new(pool, embeddings);
    let crash_hits = engine.keyword_search("crash", 10).await.unwrap();
    assert_eq!(crash_hits.len(), 1);
    let deploy_hits = engine.keyword_search("deploy", 10).await.unwrap();
    assert_eq!(deploy_hits.len(), 1);
    assert_ne!(crash_hits[0].channel, deploy_hits[0].channel);
}

/// The hash-dedup store (C11) observes repeated content across sessions
/// without ever overriding the relational store's own dedup decision.
#[tokio::test]
async fn hash_store_tracks_repeats_without_blocking_fresh_content() {
    use tokio::sync::Mutex;

    let dir = tempfile::tempdir().unwrap();
    let hash_store = Arc::new(Mutex::new(HashStore::open(dir.path()).unwrap()));

    let registry = ParserRegistry::new();
    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool, embeddings).with_hash_store(hash_store.clone());

    let window = slack_window("#general", "March 3rd, 2023", &[("alice", "2:41 PM", "standup notes for today")]);
    let parsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    let first = pipeline.ingest_conversation("s1", "Acme", &parsed.conversations[0]).await.unwrap();
    assert_eq!(first.new_messages, 1);

    {
        let store = hash_store.lock().await;
        assert_eq!(store.total_count(), 1);
    }

    let reparsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    let second = pipeline.ingest_conversation("s1", "Acme", &reparsed.conversations[0]).await.unwrap();
    assert_eq!(second.duplicate_messages, 1);
}

/// §4.10 conversation chunking, exercised against real ingested rows
/// rather than hand-built `StoredMessage` values.
#[tokio::test]
async fn conversation_chunks_split_on_time_gap_after_real_ingestion() {
    let window = slack_window(
        "#general",
        "March 3rd, 2023",
        &[("alice", "2:41 PM", "morning standup"), ("alice", "2:42 PM", "all good here")],
    );
    let registry = ParserRegistry::new();
    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool.clone(), embeddings.clone());
    let parsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    pipeline.ingest_conversation("s1", "Acme", &parsed.conversations[0]).await.unwrap();

    let engine = QueryEngine::new(pool, embeddings);
    let since = Local.with_ymd_and_hms(2023, 3, 3, 0, 0, 0).unwrap().to_rfc3339();
    let until = Local.with_ymd_and_hms(2023, 3, 4, 0, 0, 0).unwrap().to_rfc3339();
    let chunks = engine.conversation_chunks("Acme", "#general", &since, &until).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len(), 2);
}

/// S5: the literal WhatsApp row description string, parsed through the
/// two-pass "table" lookup and description grammar, then ingested and
/// made searchable the same way Slack is.
#[tokio::test]
async fn whatsapp_direct_message_parses_and_ingests() {
    let list_table = MockElement::leaf().description("table").build();
    let row = MockElement::leaf()
        .description("Message from Alice, hello there, 3:02 PM, Received from Alice, Read")
        .build();
    let chat_table = MockElement::leaf().description("table").child(row).build();
    let window = MockElement::leaf().child(list_table).child(chat_table).build();

    let registry = ParserRegistry::new();
    let parsed = registry.parse(AppKind::WhatsApp, &window, Deadline::never()).await.unwrap();
    assert_eq!(parsed.conversations.len(), 1);
    assert_eq!(parsed.conversations[0].channel_type, ChannelType::DirectMessage);
    assert_eq!(parsed.conversations[0].messages.len(), 1);
    assert_eq!(parsed.conversations[0].messages[0].sender, "Alice");
    assert_eq!(parsed.conversations[0].messages[0].content, "hello there");

    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool.clone(), embeddings.clone());
    let result = pipeline.ingest_conversation("s1", "Personal", &parsed.conversations[0]).await.unwrap();
    assert_eq!(result.new_messages, 1);

    let engine = QueryEngine::new(pool, embeddings);
    let hits = engine.keyword_search("hello there", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].sender, "Alice");
}

/// Structured filters compose: workspace + channel + sender + keyword
/// all narrow the same result set ingestion produced.
#[tokio::test]
async fn structured_search_narrows_by_every_filter_field() {
    let window = slack_window(
        "#general",
        "March 3rd, 2023",
        &[
            ("alice", "2:41 PM", "deploy the service"),
            ("bob", "2:42 PM", "deploy the service"),
            ("alice", "2:43 PM", "unrelated chatter"),
        ],
    );
    let registry = ParserRegistry::new();
    let (pool, embeddings) = harness().await;
    let pipeline = IngestionPipeline::new(pool.clone(), embeddings.clone());
    let parsed = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    pipeline.ingest_conversation("s1", "Acme", &parsed.conversations[0]).await.unwrap();

    let engine = QueryEngine::new(pool, embeddings);
    let hits = engine
        .structured_search(
            StructuredFilter {
                workspace: Some("Acme".into()),
                channel: Some("#general".into()),
                senders: vec!["alice".into()],
                keyword: Some("deploy".into()),
                ..Default::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].sender, "alice");
    assert_eq!(hits[0].content, "deploy the service");
}

/// A window whose channel name element is missing still parses (with a
/// warning) rather than failing the whole traversal — no app window
/// should be able to abort an entire ingestion pass.
#[tokio::test]
async fn missing_channel_name_degrades_to_a_warning_not_a_failure() {
    let window = MockElement::leaf()
        .child(
            MockElement::leaf()
                .attribute("data-qa", "virtual-list-item")
                .child(MockElement::leaf().attribute("data-qa", "message_sender").value("alice").build())
                .child(
                    MockElement::leaf()
                        .attribute("data-qa", "message_timestamp")
                        .attribute("data-ts-label", "2:41 PM")
                        .build(),
                )
                .child(MockElement::leaf().attribute("data-qa", "message_content").value("hi").build())
                .build(),
        )
        .build();

    let registry = ParserRegistry::new();
    let result = registry.parse(AppKind::Slack, &window, Deadline::never()).await.unwrap();
    assert!(!result.warnings.is_empty());
    assert_eq!(result.conversations[0].channel_name, "unknown-channel");
    assert_eq!(result.conversations[0].messages.len(), 1);
}

/// A deadline that has already passed bounds parsing to whatever the
/// traversal already yielded, rather than hanging or erroring.
#[tokio::test]
async fn already_expired_deadline_still_returns_a_result() {
    let window = slack_window("#general", "March 3rd, 2023", &[("alice", "2:41 PM", "hello")]);
    let registry = ParserRegistry::new();
    let expired = Deadline::at(std::time::Instant::now() - std::time::Duration::from_secs(1));
    let result = registry.parse(AppKind::Slack, &window, expired).await.unwrap();
    assert!(result.conversations[0].messages.is_empty() || !result.warnings.is_empty());
}

/// Sanity check on the mock element façade used throughout this file:
/// attribute lookups and child ordering behave the way every parser
/// above assumes.
#[tokio::test]
async fn mock_element_preserves_child_order_and_attributes() {
    let root = MockElement::leaf()
        .attribute("data-qa", "channel_name")
        .value("#general")
        .child(MockElement::leaf().value("first").build())
        .child(MockElement::leaf().value("second").build())
        .build();
    assert_eq!(root.attribute("data-qa").await.unwrap().as_deref(), Some("channel_name"));
    let children = root.children(slunk::accessibility::ChildRelation::Children).await.unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].value().await.unwrap().as_deref(), Some("first"));
    assert_eq!(children[1].value().await.unwrap().as_deref(), Some("second"));
}
