//! Upload directory → extract → chunk → embed → store → search, end to end
//! with deterministic providers.

mod common;

use common::{keyword_vector, minimal_docx, minimal_pdf, test_env};
use tutor_rag::ingest::{self, file_category};
use tutor_rag::models::MetadataFilter;
use tutor_rag::store::KnowledgeStore;
use tutor_rag::tracker::ProcessedFiles;

#[tokio::test]
async fn ingests_every_supported_format() {
    let env = test_env("unused");
    let uploads = env.assistant.config().uploads.dir.clone();

    std::fs::write(uploads.join("pricing_2024.txt"), "Each lesson price is 30 dollars.").unwrap();
    std::fs::write(
        uploads.join("about.rtf"),
        r"{\rtf1\ansi{\fonttbl{\f0 Arial;}}\f0 Our teacher team is friendly.\par}",
    )
    .unwrap();
    std::fs::write(
        uploads.join("curriculum.docx"),
        minimal_docx(&["Grammar course", "Speaking course"]),
    )
    .unwrap();
    std::fs::write(uploads.join("guide.pdf"), minimal_pdf("schedule for every lesson")).unwrap();

    let stats = ingest::process_uploads(&env.assistant, false).await.unwrap();
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.failed, 0);

    let store = env.assistant.store().read().await;
    let kinds: Vec<&str> = store
        .knowledge_items()
        .iter()
        .map(|i| i.metadata.file_type.as_str())
        .collect();
    for kind in ["txt", "rtf", "docx", "pdf"] {
        assert!(kinds.contains(&kind), "missing {kind} in {kinds:?}");
    }

    let rtf = store
        .knowledge_items()
        .iter()
        .find(|i| i.metadata.file_type == "rtf")
        .unwrap();
    assert!(rtf.content.contains("Our teacher team is friendly."));
    assert!(!rtf.content.contains("Arial"));
    assert_eq!(rtf.metadata.category, "Information");

    let pdf = store
        .knowledge_items()
        .iter()
        .find(|i| i.metadata.file_type == "pdf")
        .unwrap();
    assert_eq!(pdf.metadata.page, Some(1));
    assert_eq!(pdf.metadata.category, "User Guide");
    assert!(pdf.content.contains("schedule"));

    let pricing = store
        .search_by_metadata(&MetadataFilter::category("Pricing"));
    assert_eq!(pricing.len(), 1);
    assert_eq!(pricing[0].metadata.source, "pricing_2024.txt");
}

#[tokio::test]
async fn processed_files_are_skipped_and_survive_reopen() {
    let env = test_env("unused");
    let config = env.assistant.config().clone();
    std::fs::write(config.uploads.dir.join("general.txt"), "General course info.").unwrap();

    let first = ingest::process_uploads(&env.assistant, false).await.unwrap();
    assert_eq!(first.processed, 1);

    let second = ingest::process_uploads(&env.assistant, false).await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);

    let tracker = ProcessedFiles::new(&config.uploads.processed_files);
    assert!(tracker.is_processed("general.txt"));

    let reopened = KnowledgeStore::open(&config.store.path).unwrap();
    assert_eq!(reopened.knowledge_len(), 1);
    assert_eq!(
        reopened.knowledge_items()[0].metadata.category,
        "General Information"
    );
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let env = test_env("unused");
    let config = env.assistant.config().clone();
    std::fs::write(config.uploads.dir.join("notes.txt"), "Lesson notes.").unwrap();

    let stats = ingest::process_uploads(&env.assistant, true).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(env.assistant.store().read().await.knowledge_len(), 0);
    assert!(!ProcessedFiles::new(&config.uploads.processed_files).is_processed("notes.txt"));
}

#[tokio::test]
async fn broken_and_empty_files_fail_without_being_marked() {
    let env = test_env("unused");
    let config = env.assistant.config().clone();
    std::fs::write(config.uploads.dir.join("broken.pdf"), b"%PDF-garbage").unwrap();
    std::fs::write(config.uploads.dir.join("empty.txt"), "   \n ").unwrap();
    std::fs::write(config.uploads.dir.join("ok.txt"), "Teacher biographies.").unwrap();

    let stats = ingest::process_uploads(&env.assistant, false).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 2);

    let tracker = ProcessedFiles::new(&config.uploads.processed_files);
    assert!(tracker.is_processed("ok.txt"));
    assert!(!tracker.is_processed("broken.pdf"));
    assert!(!tracker.is_processed("empty.txt"));
}

#[tokio::test]
async fn upload_sanitises_name_and_search_ranks_it_first() {
    let env = test_env("unused");

    let (name, chunks) = ingest::ingest_upload(
        &env.assistant,
        "../../secret dir/Teacher List.txt",
        b"Every teacher has a teacher certificate.",
        "Teachers",
    )
    .await
    .unwrap();
    assert_eq!(name, "Teacher_List.txt");
    assert_eq!(chunks, 1);
    assert!(env
        .assistant
        .config()
        .uploads
        .dir
        .join("Teacher_List.txt")
        .exists());

    ingest::ingest_upload(&env.assistant, "prices.txt", b"The price and cost.", "Pricing")
        .await
        .unwrap();

    let hits = env.assistant.search("teacher", 5, None).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].metadata.source, "Teacher_List.txt");
    assert!(hits[0].relevance > hits[1].relevance);

    let filtered = env.assistant.search("teacher", 5, Some("Pricing")).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].metadata.source, "prices.txt");
}

#[tokio::test]
async fn upload_rejects_disallowed_extension() {
    let env = test_env("unused");
    let err = ingest::ingest_upload(&env.assistant, "run.sh", b"echo", "Other")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not allowed"));
}

#[tokio::test]
async fn faq_context_is_scoped_to_session() {
    let env = test_env("Lessons cost 30 dollars.");
    ingest::ingest_upload(&env.assistant, "prices.txt", b"Lesson price list.", "Pricing")
        .await
        .unwrap();

    env.assistant
        .answer_faq("What is the price?", Some("Pricing"), Some("alice"))
        .await
        .unwrap();
    env.assistant
        .answer_faq("And the cost per lesson?", None, Some("alice"))
        .await
        .unwrap();
    assert!(env.chat.last_prompt().contains("RECENT CONVERSATION CONTEXT"));
    assert!(env.chat.last_prompt().contains("What is the price?"));

    env.assistant
        .answer_faq("What is the price?", Some("Pricing"), Some("bob"))
        .await
        .unwrap();
    assert!(!env.chat.last_prompt().contains("RECENT CONVERSATION CONTEXT"));

    let status = env.assistant.status().await;
    assert_eq!(status.context_items, 3);
}

#[test]
fn extra_rules_take_precedence() {
    let mut rules = tutor_rag::config::UploadsConfig::default().category_rules;
    rules.insert(0, tutor_rag::config::CategoryRule::new("2024", "Archive"));
    assert_eq!(file_category("pricing_2024.pdf", &rules), "Archive");
    assert_eq!(file_category("pricing.pdf", &rules), "Pricing");
}

#[test]
fn stub_vectors_are_never_zero() {
    assert!(keyword_vector("").iter().any(|v| *v > 0.0));
}

#[tokio::test]
async fn concurrent_ingestion_records_every_file_once() {
    let env = test_env("unused");
    let config = env.assistant.config().clone();
    for name in ["one.txt", "two.txt", "three.txt"] {
        std::fs::write(config.uploads.dir.join(name), format!("Course notes {name}.")).unwrap();
    }

    let (scanned, first, second) = tokio::join!(
        ingest::process_uploads(&env.assistant, false),
        ingest::ingest_upload(&env.assistant, "four.txt", b"Grammar lesson notes.", "Curriculum"),
        ingest::ingest_upload(&env.assistant, "five.txt", b"Speaking lesson notes.", "Curriculum"),
    );
    scanned.unwrap();
    first.unwrap();
    second.unwrap();

    let tracker = ProcessedFiles::new(&config.uploads.processed_files);
    for name in ["one.txt", "two.txt", "three.txt", "four.txt", "five.txt"] {
        assert!(tracker.is_processed(name), "{name} not recorded");
    }
    assert_eq!(env.assistant.store().read().await.knowledge_len(), 5);
}
