//! Live host filtering

use gw_core::HostEntry;

/// Search query and the hosts it currently matches
///
/// The match list is always derived from the full list and the query;
/// every edit recomputes it.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    query: String,
    matches: Vec<HostEntry>,
}

impl SearchFilter {
    /// Hosts whose name contains `query` (case-sensitive), in list order
    pub fn apply(query: &str, hosts: &[HostEntry]) -> Vec<HostEntry> {
        hosts
            .iter()
            .filter(|h| h.hostname().contains(query))
            .cloned()
            .collect()
    }

    /// Unfiltered view of `hosts`
    pub fn new(hosts: &[HostEntry]) -> Self {
        Self {
            query: String::new(),
            matches: hosts.to_vec(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[HostEntry] {
        &self.matches
    }

    pub fn push(&mut self, c: char, hosts: &[HostEntry]) {
        self.query.push(c);
        self.recompute(hosts);
    }

    pub fn pop(&mut self, hosts: &[HostEntry]) {
        if self.query.pop().is_some() {
            self.recompute(hosts);
        }
    }

    pub fn clear(&mut self, hosts: &[HostEntry]) {
        self.query.clear();
        self.recompute(hosts);
    }

    /// Re-run the current query, e.g. after the host list changed
    pub fn recompute(&mut self, hosts: &[HostEntry]) {
        self.matches = Self::apply(&self.query, hosts);
        tracing::trace!("Search {:?}: {} of {} hosts", self.query, self.matches.len(), hosts.len());
    }
}
