use crate::dictionary::{HostRule, Interceptor, SearchMethod};
use crate::download::DownloadId;
use crate::state::{LinkStatus, ProcessorStatus};

/// Identifier of a processor, unique within a session
pub type ProcessorId = u64;

/// One file to download, found by a processor
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadLink {
    /// `<processor id>-<index>`
    pub id: String,
    pub link: String,
    pub status: LinkStatus,
    /// Set once the download backend accepted the download
    pub download_item_id: Option<DownloadId>,
    /// Name suggested by the rule's file name attribute
    pub file_name: Option<String>,
}

/// A discovery job: one candidate page or file to turn into download links
#[derive(Debug, Clone)]
pub struct Processor {
    pub id: ProcessorId,
    pub rule_id: String,
    pub matching_url: String,
    pub origin_url: String,
    pub page_title: Option<String>,
    pub search: SearchMethod,
    pub status: ProcessorStatus,
    /// Post-search interceptors applied to every found link
    pub interceptors: Vec<Interceptor>,
    pub link_attribute: Option<String>,
    pub file_name_attribute: Option<String>,
    pub file_name_interceptors: Vec<Interceptor>,
    /// Markup of the source page when the page itself is the target
    ///
    /// Consumed by the first handling; a rescheduled processor fetches
    /// the page again.
    pub document: Option<String>,
    pub download_links: Vec<DownloadLink>,
    /// Bumped on every reset so results of an earlier attempt can be told apart
    pub attempt: u32,
    next_link_index: usize,
}

impl Processor {
    pub fn from_rule(
        id: ProcessorId,
        rule: &HostRule,
        matching_url: impl Into<String>,
        origin_url: impl Into<String>,
        page_title: Option<String>,
    ) -> Self {
        Self {
            id,
            rule_id: rule.id.clone(),
            matching_url: matching_url.into(),
            origin_url: origin_url.into(),
            page_title,
            search: rule.search.clone(),
            status: ProcessorStatus::Waiting,
            interceptors: rule.post_search_interceptors.clone(),
            link_attribute: rule.link_attribute.clone(),
            file_name_attribute: rule.file_name_attribute.clone(),
            file_name_interceptors: rule.file_name_interceptors.clone(),
            document: None,
            download_links: Vec::new(),
            attempt: 0,
            next_link_index: 0,
        }
    }

    /// Numeric id of the extraction strategy, 0 when unresolved
    pub fn ext_method(&self) -> u8 {
        self.search.id()
    }

    /// Returns to `Waiting` and forgets every download link
    pub fn reset(&mut self) {
        self.status = ProcessorStatus::Waiting;
        self.download_links.clear();
        self.attempt += 1;
    }

    /// Appends a download link and returns its id
    ///
    /// Ids keep increasing across resets so a late answer about a discarded
    /// link never lands on a new one.
    pub fn push_link(&mut self, link: String, status: LinkStatus, file_name: Option<String>) -> String {
        let id = format!("{}-{}", self.id, self.next_link_index);
        self.next_link_index += 1;
        self.download_links.push(DownloadLink {
            id: id.clone(),
            link,
            status,
            download_item_id: None,
            file_name,
        });
        id
    }

    pub fn link(&self, link_id: &str) -> Option<&DownloadLink> {
        self.download_links.iter().find(|l| l.id == link_id)
    }

    pub fn link_mut(&mut self, link_id: &str) -> Option<&mut DownloadLink> {
        self.download_links.iter_mut().find(|l| l.id == link_id)
    }
}

/// Hands out processor ids
#[derive(Debug, Default)]
pub struct ProcessorIdGenerator {
    next: ProcessorId,
}

impl ProcessorIdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> ProcessorId {
        let id = self.next.max(1);
        self.next = id + 1;
        id
    }
}
