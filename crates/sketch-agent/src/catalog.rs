//! Symbol-catalog loading for the offline documentation index.
//!
//! The corpus is built from one JSON file per provider service, each mapping
//! a category name to a list of fully-qualified symbol names, e.g.
//! `{"compute": ["diagrams.aws.compute.EC2", ...]}` in `aws.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// One indexable documentation entry for a catalog symbol
#[derive(Debug, Clone, Serialize)]
pub struct SymbolDocument {
    /// The text that gets embedded
    pub text: String,
    /// Canonical fully-qualified symbol name, returned by lookups
    pub module: String,
    /// Provider service the symbol belongs to (catalog file stem)
    pub service: String,
    /// Category within the service
    pub section: String,
}

/// Load every `*.json` catalog file in a directory. Each symbol yields two
/// documents: the bare class name, and the provider name paired with the
/// class name, so both "EC2" and "aws EC2" style queries land near it.
pub fn load_documents(dir: &Path) -> Result<Vec<SymbolDocument>> {
    let mut documents = Vec::new();

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    entries.sort();

    for path in entries {
        let service = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let content = std::fs::read_to_string(&path)?;
        let catalog: BTreeMap<String, Vec<String>> = match serde_json::from_str(&content) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(file = %path.display(), "skipping unreadable catalog file: {}", e);
                continue;
            }
        };

        for (section, modules) in catalog {
            for module in modules {
                documents.extend(documents_for_symbol(&module, &service, &section));
            }
        }
    }

    Ok(documents)
}

fn documents_for_symbol(module: &str, service: &str, section: &str) -> Vec<SymbolDocument> {
    let parts: Vec<&str> = module.split('.').collect();
    let class_name = parts.last().copied().unwrap_or(module);

    let mut documents = vec![SymbolDocument {
        text: class_name.to_string(),
        module: module.to_string(),
        service: service.to_string(),
        section: section.to_string(),
    }];

    // "diagrams.aws.compute.EC2" also indexes as "aws EC2"
    if parts.len() > 2 {
        documents.push(SymbolDocument {
            text: format!("{} {}", parts[1], class_name),
            module: module.to_string(),
            service: service.to_string(),
            section: section.to_string(),
        });
    }

    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_for_qualified_symbol() {
        let docs = documents_for_symbol("diagrams.aws.compute.EC2", "aws", "compute");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "EC2");
        assert_eq!(docs[1].text, "aws EC2");
        assert!(docs.iter().all(|d| d.module == "diagrams.aws.compute.EC2"));
        assert!(docs.iter().all(|d| d.section == "compute"));
    }

    #[test]
    fn test_documents_for_short_symbol() {
        let docs = documents_for_symbol("EC2", "aws", "compute");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "EC2");
    }

    #[test]
    fn test_load_documents_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("aws.json"),
            r#"{"compute": ["diagrams.aws.compute.EC2"], "network": ["diagrams.aws.network.ELB"]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 4);
        assert!(docs.iter().any(|d| d.text == "aws ELB"));
        assert!(docs.iter().all(|d| d.service == "aws"));
    }
}
