use std::collections::VecDeque;
use std::sync::Mutex;

/// Fixed-size ring of recently submitted job descriptions, shown by the
/// status route. Observability only; nothing reads it on the crawl path.
pub struct TraceBuffer {
  capacity: usize,
  entries: Mutex<VecDeque<String>>,
}

impl TraceBuffer {
  pub fn new(capacity: usize) -> Self {
    // A ring that holds nothing is useless; keep at least one entry.
    let capacity = capacity.max(1);
    Self {
      capacity,
      entries: Mutex::new(VecDeque::with_capacity(capacity)),
    }
  }

  pub fn record(&self, entry: String) {
    let mut entries = self.entries.lock().unwrap();
    while entries.len() >= self.capacity {
      entries.pop_front();
    }
    entries.push_back(entry);
  }

  /// Entries newest first.
  pub fn recent(&self) -> Vec<String> {
    self.entries.lock().unwrap().iter().rev().cloned().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_capacity_stays_bounded() {
    let trace = TraceBuffer::new(0);
    for n in 1..=3 {
      trace.record(format!("job {n}"));
    }
    assert_eq!(trace.recent(), vec!["job 3"]);
  }

  #[test]
  fn ring_drops_oldest_entries() {
    let trace = TraceBuffer::new(3);
    for n in 1..=5 {
      trace.record(format!("job {n}"));
    }
    assert_eq!(trace.recent(), vec!["job 5", "job 4", "job 3"]);
  }
}
