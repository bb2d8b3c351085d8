//! Statistics of a harvest session
//!
//! Collected from the processors a session knows about once it has run.

use crate::processor::Processor;
use crate::state::{LinkStatus, ProcessorStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct SessionStatistics {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Total number of processors built
    pub total_processors: u64,

    /// Count of processors by status
    pub processors_by_status: HashMap<ProcessorStatus, u64>,

    /// Total number of download links found
    pub total_links: u64,

    /// Count of download links by status
    pub links_by_status: HashMap<LinkStatus, u64>,
}

impl SessionStatistics {
    /// Counts the processors and links of a finished session
    pub fn collect<'a>(
        processors: impl IntoIterator<Item = &'a Processor>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self {
            started_at,
            finished_at: Utc::now(),
            total_processors: 0,
            processors_by_status: HashMap::new(),
            total_links: 0,
            links_by_status: HashMap::new(),
        };

        for processor in processors {
            stats.total_processors += 1;
            *stats.processors_by_status.entry(processor.status).or_insert(0) += 1;
            for link in &processor.download_links {
                stats.total_links += 1;
                *stats.links_by_status.entry(link.status).or_insert(0) += 1;
            }
        }

        stats
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    pub fn links_with(&self, status: LinkStatus) -> u64 {
        self.links_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Download links that ended in an error status
    pub fn failed_links(&self) -> u64 {
        self.links_by_status
            .iter()
            .filter(|(status, _)| status.is_error())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SessionStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Processors: {}", stats.total_processors);
    println!("  Download links: {}", stats.total_links);
    println!("  Duration: {}s", stats.duration_seconds());
    println!();

    println!("Processors by Status:");
    let mut processor_counts: Vec<_> = stats.processors_by_status.iter().collect();
    processor_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (status, count) in processor_counts {
        println!("  {}: {}", status, count);
    }
    println!();

    if !stats.links_by_status.is_empty() {
        println!("Links by Status:");
        let mut link_counts: Vec<_> = stats.links_by_status.iter().collect();
        link_counts.sort_by(|a, b| b.1.cmp(a.1));
        for (status, count) in link_counts {
            let percentage = (*count as f64 / stats.total_links as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", status, count, percentage);
        }
        println!();
    }

    let succeeded = stats.links_with(LinkStatus::Success);
    let attempted = stats.total_links - stats.links_with(LinkStatus::AlreadyDownloaded);
    let success_rate = if attempted > 0 {
        (succeeded as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} links downloaded)",
        success_rate, succeeded, attempted
    );
}
