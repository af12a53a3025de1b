use std::cmp::Ordering;

use serde_json::Value;

use crate::signaling::{
    document::Document,
    paths::{CollectionPath, DocPath},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::In(field, values) => doc.get(field).is_some_and(|v| values.contains(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Filtered, ordered, limited read over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_owned(), value.into()));
        self
    }

    #[must_use]
    pub fn where_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(field.to_owned(), values));
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_owned(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Runs the query over every document of the store. Documents lacking
    /// the order-by field are excluded; ties are broken by path.
    pub fn apply<'a>(&self, docs: impl Iterator<Item = &'a Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs
            .filter(|d| d.path.parent() == self.collection)
            .filter(|d| self.filters.iter().all(|f| f.matches(d)))
            .filter(|d| match &self.order_by {
                Some((field, _)) => d.get(field).is_some(),
                None => true,
            })
            .cloned()
            .collect();

        match &self.order_by {
            Some((field, dir)) => out.sort_by(|a, b| {
                let ord = compare_values(a.get(field), b.get(field));
                let ord = match dir {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                ord.then_with(|| a.path.cmp(&b.path))
            }),
            None => out.sort_by(|a, b| a.path.cmp(&b.path)),
        }

        if let Some(n) = self.limit {
            out.truncate(n);
        }
        out
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// What a subscription observes.
#[derive(Debug, Clone, PartialEq)]
pub enum Watch {
    /// A single document; its snapshot holds zero or one docs.
    Document(DocPath),
    Query(Query),
}

impl Watch {
    pub fn evaluate<'a>(&self, docs: impl Iterator<Item = &'a Document>) -> Vec<Document> {
        match self {
            Watch::Document(path) => docs.filter(|d| &d.path == path).cloned().collect(),
            Watch::Query(q) => q.apply(docs),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::signaling::{document::Fields, paths::calls_collection};
    use serde_json::json;

    fn doc(id: &str, status: &str, created: u64) -> Document {
        let mut f = Fields::new();
        f.insert("status".into(), json!(status));
        f.insert("createdAt".into(), json!(created));
        Document::new(calls_collection("s1").doc(id), f)
    }

    #[test]
    fn in_filter_order_and_limit() {
        let docs = [
            doc("b", "ringing", 20),
            doc("a", "ended", 5),
            doc("c", "connected", 10),
        ];
        let q = Query::new(calls_collection("s1"))
            .where_in("status", vec![json!("ringing"), json!("connected")])
            .order_by("createdAt", Direction::Asc)
            .limit(1);
        let out = q.apply(docs.iter());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), "c");
    }

    #[test]
    fn other_collections_are_ignored() {
        let docs = [doc("a", "ringing", 1)];
        let q = Query::new(calls_collection("s2"));
        assert!(q.apply(docs.iter()).is_empty());
    }

    #[test]
    fn missing_order_field_is_excluded() {
        let mut f = Fields::new();
        f.insert("status".into(), json!("ringing"));
        let no_ts = Document::new(calls_collection("s1").doc("z"), f);
        let docs = [no_ts, doc("a", "ringing", 3)];
        let q = Query::new(calls_collection("s1")).order_by("createdAt", Direction::Desc);
        let ids: Vec<_> = q.apply(docs.iter()).iter().map(|d| d.id().to_owned()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn document_watch_selects_one_path() {
        let docs = [doc("a", "ringing", 1), doc("b", "ringing", 2)];
        let watch = Watch::Document(calls_collection("s1").doc("b"));
        let out = watch.evaluate(docs.iter());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), "b");
    }
}
