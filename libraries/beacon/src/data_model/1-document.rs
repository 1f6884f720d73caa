//! # Documents and queries
//! A document is an opaque JSON record keyed by a string id, unique within its collection.
//! Queries only carry what the app asks of the hosted database: equality filters, one ordering, a page size and a cursor.

use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.get(name)
    }

    /// Deserializes the document body. The id is not part of the body.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub field: String,
    pub equals: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    /// Id of the last document of the previous page.
    pub start_after: Option<String>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn filter_eq(mut self, field: impl Into<String>, equals: serde_json::Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            equals,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(id.into());
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.filters
            .iter()
            .all(|filter| document.field(&filter.field) == Some(&filter.equals))
    }

    /// Stable sort by the ordering field. Documents missing the field go last in either direction.
    pub fn sort(&self, documents: &mut [Document]) {
        let Some(order_by) = &self.order_by else {
            return;
        };
        documents.sort_by(|a, b| {
            match (a.field(&order_by.field), b.field(&order_by.field)) {
                (Some(a), Some(b)) => {
                    let ordering = compare_values(a, b);
                    match order_by.direction {
                        Direction::Ascending => ordering,
                        Direction::Descending => ordering.reverse(),
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }

    /// Filter, order, then page. This is what a hosted database does server-side; the in-memory backend uses it directly.
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> super::Snapshot {
        let mut matching: Vec<Document> = documents
            .into_iter()
            .filter(|document| self.matches(document))
            .collect();
        self.sort(&mut matching);

        if let Some(cursor) = &self.start_after {
            match matching.iter().position(|d| &d.id == cursor) {
                Some(position) => {
                    matching.drain(..=position);
                }
                None => log::warn!("Query cursor {cursor} is not in {}", self.collection),
            }
        }

        if let Some(limit) = self.limit {
            matching.truncate(limit);
        }

        super::Snapshot::new(matching)
    }
}

/// Total order over the JSON values a document field can hold. Values of different kinds order by kind.
fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value;

    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        // ISO dates sort correctly as strings
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}
