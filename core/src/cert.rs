//! Peer certificate inspection.
//!
//! Only the leaf certificate matters: its subject carries the fields used for
//! classification, and its subject alternative names carry the DNS labels used
//! in DNS-name match mode.

use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::x509::AttributeTypeAndValue;

use crate::probe::ProbeError;

/// Subject fields of a leaf certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertSubject {
    pub common_name: String,
    /// First organization entry, empty when absent.
    pub organization: String,
    /// First country entry, empty when absent.
    pub country: String,
    pub dns_names: Vec<String>,
}

impl CertSubject {
    pub fn new(common_name: &str, organization: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: organization.to_string(),
            ..Self::default()
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_string();
        self
    }

    pub fn with_dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Extracts the subject of a DER-encoded certificate.
pub fn inspect(der: &[u8]) -> Result<CertSubject, ProbeError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| ProbeError::Certificate(e.to_string()))?;

    let subject = cert.subject();
    let common_name: String = first_value(subject.iter_common_name());
    let organization: String = first_value(subject.iter_organization());
    let country: String = first_value(subject.iter_country());

    let mut dns_names: Vec<String> = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                dns_names.push(dns.to_string());
            }
        }
    }

    Ok(CertSubject {
        common_name,
        organization,
        country,
        dns_names,
    })
}

fn first_value<'a: 'b, 'b>(mut values: impl Iterator<Item = &'b AttributeTypeAndValue<'a>>) -> String {
    values
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
        .unwrap_or_default()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
