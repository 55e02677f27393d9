use fibre_costcache::{CostCacheBuilder, RecoverableValue, RecoverySource};
use std::time::Duration;

/// A parsed document that can be rebuilt from its source text.
struct Document {
  words: Vec<String>,
}

struct Reparse;

impl RecoverySource<Document> for Reparse {
  type Saved = String;

  fn save(&self, doc: &Document) -> String {
    println!("  saving document ({} words)", doc.words.len());
    doc.words.join(" ")
  }

  fn recover(&self, text: &String) -> Document {
    println!("  reparsing document");
    Document {
      words: text.split_whitespace().map(str::to_string).collect(),
    }
  }
}

fn main() {
  let cache = CostCacheBuilder::new(|doc: &Document| doc.words.len() as u64)
    .data_collection_window(Duration::ZERO)
    .build()
    .expect("Failed to build cache");

  let doc = RecoverableValue::new(
    Document {
      words: "the quick brown fox".split(' ').map(str::to_string).collect(),
    },
    Reparse,
    &cache,
  );
  println!("materialized: {}", doc.is_materialized());

  println!("clearing the cache");
  cache.clear();
  println!("materialized: {}, saved: {}", doc.is_materialized(), doc.is_saved());

  let words = doc.get_value().words.len();
  println!("recovered {words} words; materialized: {}", doc.is_materialized());
}
