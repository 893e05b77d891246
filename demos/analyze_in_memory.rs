//! Analyze a small in-memory keyspace and print both reports.
//!
//! Run with: `cargo run --example analyze_in_memory`

use keyspace_analysis::{
    run_analysis, AnalysisOptions, ClassifierConfig, MemorySink, MemoryStore, NoEnrichment,
    ReportTargets, StaticTemplates, StoreValue, TemplateSet,
};

fn print_report(title: &str, sink: &MemorySink) {
    println!("{}", title);
    println!("{}", "-".repeat(title.len()));
    println!("{}", sink.header.join(" | "));
    for row in sink.text_rows() {
        println!("{}", row.join(" | "));
    }
    println!();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let templates = StaticTemplates::new(TemplateSet::new(
        &[
            "orders:ACCOUNT_ID",
            "orders:ACCOUNT_ID:status",
            "cart:ACCOUNT_ID:ITEM_ID",
            "session:SESSION_ID",
        ],
        Some("ACCOUNT_ID"),
    ));

    let mut store = MemoryStore::new();
    for account in ["acme", "initech", "globex"] {
        store.insert(
            &format!("orders:{}", account),
            StoreValue::hash(&[("total", "1999"), ("currency", "EUR")]),
        );
        store.insert(&format!("orders:{}:status", account), StoreValue::string("shipped"));
    }
    for item in 0..5 {
        store.insert(
            &format!("cart:acme:{}", item),
            StoreValue::list(&["sku-1", "sku-2"]),
        );
    }
    store.insert("session:f00d", StoreValue::string("{\"user\":1}"));
    store.insert("lock:orders:acme", StoreValue::string("1"));
    store.insert("resque:queue:mailers", StoreValue::list(&["job-1", "job-2"]));

    let mut size = MemorySink::new();
    let mut partition = MemorySink::new();
    let options = AnalysisOptions {
        classifier: ClassifierConfig {
            workers: 2,
            batch_size: 4,
            ..Default::default()
        },
        strict_sanity: true,
    };

    let outcome = run_analysis(
        &options,
        &store,
        &templates,
        ReportTargets {
            size: &mut size,
            partition: &mut partition,
            enricher: &NoEnrichment,
        },
    )?;

    print_report("Size by template", &size);
    print_report("Size by partition", &partition);

    println!("Unregistered keys by label:");
    for label in &outcome.stray {
        println!("  {:<10} {}", label.label, label.count);
    }
    Ok(())
}
