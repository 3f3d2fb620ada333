//! Certificate-based classification.
//!
//! An address is accepted only when its certificate organization is on the
//! allowlist and one of the `gws` labels (checked first) or `gvs` labels
//! matches the certificate. Every probe gets exactly one verdict.

use frontscan_common::config::{MatchMode, ScanConfig};
use frontscan_common::record::Category;

use crate::cert::CertSubject;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The common name to record may be a SAN entry in DNS-name mode.
    Accepted { category: Category, common_name: String },
    Rejected,
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    organizations: Vec<String>,
    gws: Vec<String>,
    gvs: Vec<String>,
    mode: MatchMode,
}

impl Classifier {
    pub fn new(organizations: Vec<String>, gws: Vec<String>, gvs: Vec<String>, mode: MatchMode) -> Self {
        Self {
            organizations,
            gws,
            gvs,
            mode,
        }
    }

    pub fn from_config(cfg: &ScanConfig) -> Self {
        Self::new(
            cfg.organizations.clone(),
            cfg.gws_domains.clone(),
            cfg.gvs_domains.clone(),
            cfg.match_mode(),
        )
    }

    pub fn classify(&self, subject: &CertSubject) -> Verdict {
        if !self.organizations.iter().any(|org| *org == subject.organization) {
            return Verdict::Rejected;
        }

        let buckets = [(Category::Gws, &self.gws), (Category::Gvs, &self.gvs)];
        for (category, labels) in buckets {
            for label in labels.iter() {
                if let Some(common_name) = self.match_label(label, subject) {
                    return Verdict::Accepted {
                        category,
                        common_name,
                    };
                }
            }
        }

        Verdict::Rejected
    }

    fn match_label(&self, label: &str, subject: &CertSubject) -> Option<String> {
        match self.mode {
            MatchMode::CommonName => (label == subject.common_name).then(|| subject.common_name.clone()),
            MatchMode::DnsName => std::iter::once(&subject.common_name)
                .chain(subject.dns_names.iter())
                .find(|name| name.starts_with(label))
                .cloned(),
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
