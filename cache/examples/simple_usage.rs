use fibre_costcache::{CostCacheBuilder, InlineSpawner};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
  // Keep at least 2 buffers; let the total size float between 1 KiB and 4 KiB.
  let cache = CostCacheBuilder::new(|buf: &Vec<u8>| buf.len() as u64)
    .min_count(2)
    .cost_bounds(1024, 4096)
    .fixed_increment(256)
    .data_collection_window(Duration::from_millis(10))
    .spawner(InlineSpawner)
    .build()
    .expect("Failed to build cache");

  let hot = Arc::new(vec![0u8; 512]);
  for _ in 0..50 {
    cache.access(Arc::clone(&hot));
  }

  for i in 0..20 {
    let buf = Arc::new(vec![i as u8; 512]);
    cache.add_or_access(buf, move |evicted| {
      println!("Evicted buffer #{i} ({} bytes)", evicted.len());
    });
    thread::sleep(Duration::from_millis(15));
  }

  println!("\nHot buffer still cached: {}", cache.contains(&hot));
  println!("Tracked buffers: {}", cache.len());
  println!("Current ceiling: {:.0} bytes", cache.current_ceiling());
  println!("\nCache metrics: {:#?}", cache.metrics());
}
