//! # Snapshot
//! The full result set of a query at one point in time. Snapshots are never patched: the next one replaces this one.

use super::Document;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn last(&self) -> Option<&Document> {
        self.documents.last()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl FromIterator<Document> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
