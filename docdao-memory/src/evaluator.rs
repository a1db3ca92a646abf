//! Evaluation of MongoDB-style filter, update, projection and sort documents.
//!
//! This module gives the in-memory backend the subset of query semantics the CRUD
//! engine relies on. Field paths may be dotted (`"profile.email"`).

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document as BsonDocument, datetime::DateTime, oid::ObjectId};

use docdao_core::error::{DocumentStoreError, DocumentStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so that `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(HashMap<&'a str, Comparable<'a>>),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(message.into())
}

/// Resolves a dotted field path.
pub(crate) fn lookup<'a>(document: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Writes `value` at a dotted field path, creating intermediate documents.
pub(crate) fn set_path(document: &mut BsonDocument, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(BsonDocument::new()));

            match child {
                Bson::Document(child) => set_path(child, rest, value),
                _ => Err(invalid(format!("cannot create field '{rest}' inside non-document '{head}'"))),
            }
        }
    }
}

/// Removes the value at a dotted field path, if present.
pub(crate) fn remove_path(document: &mut BsonDocument, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(child) => remove_path(child, rest),
            _ => None,
        },
    }
}

/// Evaluates MongoDB-style filter documents against stored documents.
pub(crate) struct FilterEvaluator;

impl FilterEvaluator {
    pub(crate) fn matches(document: &BsonDocument, filter: &BsonDocument) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            let holds = match key.as_str() {
                "$and" => Self::clauses(condition)?
                    .iter()
                    .try_fold(true, |acc, clause| Ok::<_, DocumentStoreError>(acc && Self::matches(document, clause)?))?,
                "$or" => {
                    let mut any = false;
                    for clause in Self::clauses(condition)? {
                        if Self::matches(document, clause)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$nor" => {
                    let mut none = true;
                    for clause in Self::clauses(condition)? {
                        if Self::matches(document, clause)? {
                            none = false;
                            break;
                        }
                    }
                    none
                }
                op if op.starts_with('$') => {
                    return Err(invalid(format!("unsupported top-level operator {op}")));
                }
                field => Self::field_matches(lookup(document, field), condition)?,
            };

            if !holds {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn clauses(condition: &Bson) -> DocumentStoreResult<Vec<&BsonDocument>> {
        condition
            .as_array()
            .ok_or_else(|| invalid("logical operators require an array of filters"))?
            .iter()
            .map(|clause| {
                clause
                    .as_document()
                    .ok_or_else(|| invalid("logical operator clauses must be documents"))
            })
            .collect()
    }

    fn is_operator_document(condition: &Bson) -> bool {
        condition
            .as_document()
            .and_then(|doc| doc.keys().next())
            .is_some_and(|key| key.starts_with('$'))
    }

    fn field_matches(value: Option<&Bson>, condition: &Bson) -> DocumentStoreResult<bool> {
        if !Self::is_operator_document(condition) {
            return Ok(Self::equals(value, condition));
        }

        let Some(operators) = condition.as_document() else {
            return Ok(false);
        };

        for (op, operand) in operators {
            let holds = match op.as_str() {
                "$eq" => Self::equals(value, operand),
                "$ne" => !Self::equals(value, operand),
                "$gt" => Self::compare(value, operand, |o| o == Ordering::Greater),
                "$gte" => Self::compare(value, operand, |o| o != Ordering::Less),
                "$lt" => Self::compare(value, operand, |o| o == Ordering::Less),
                "$lte" => Self::compare(value, operand, |o| o != Ordering::Greater),
                "$in" => Self::any_of(value, operand)?,
                "$nin" => !Self::any_of(value, operand)?,
                "$exists" => value.is_some() == Self::truthy(operand),
                "$not" => !Self::field_matches(value, operand)?,
                other => return Err(invalid(format!("unsupported operator {other}"))),
            };

            if !holds {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Equality with array membership, where a missing field equals `null`.
    fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
        let expected = Comparable::from(operand);

        match value {
            None => expected == Comparable::Null,
            Some(Bson::Array(items)) if !matches!(operand, Bson::Array(_)) => {
                items.iter().any(|item| Comparable::from(item) == expected)
            }
            Some(actual) => Comparable::from(actual) == expected,
        }
    }

    fn compare(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let Some(actual) = value else {
            return false;
        };

        Comparable::from(actual)
            .partial_cmp(&Comparable::from(operand))
            .is_some_and(accept)
    }

    fn any_of(value: Option<&Bson>, operand: &Bson) -> DocumentStoreResult<bool> {
        let candidates = operand
            .as_array()
            .ok_or_else(|| invalid("$in and $nin require an array"))?;

        Ok(candidates
            .iter()
            .any(|candidate| Self::equals(value, candidate)))
    }

    pub(crate) fn truthy(value: &Bson) -> bool {
        match value {
            Bson::Boolean(flag) => *flag,
            Bson::Int32(n) => *n != 0,
            Bson::Int64(n) => *n != 0,
            Bson::Double(n) => *n != 0.0,
            Bson::Null => false,
            _ => true,
        }
    }
}

/// Applies MongoDB-style update operators to documents.
pub(crate) struct UpdateApplier;

impl UpdateApplier {
    /// Applies `update` to `target`. `$setOnInsert` only takes effect when `inserting`.
    pub(crate) fn apply(
        target: &mut BsonDocument,
        update: &BsonDocument,
        inserting: bool,
    ) -> DocumentStoreResult<()> {
        if update.is_empty() {
            return Err(invalid("update document must not be empty"));
        }

        for (op, fields) in update {
            let fields = fields
                .as_document()
                .ok_or_else(|| invalid(format!("{op} requires a document")))?;

            match op.as_str() {
                "$set" => {
                    for (path, value) in fields {
                        set_path(target, path, value.clone())?;
                    }
                }
                "$setOnInsert" => {
                    if inserting {
                        for (path, value) in fields {
                            set_path(target, path, value.clone())?;
                        }
                    }
                }
                "$unset" => {
                    for (path, _) in fields {
                        remove_path(target, path);
                    }
                }
                "$inc" => {
                    for (path, amount) in fields {
                        let current = lookup(target, path).cloned();
                        set_path(target, path, Self::increment(path, current, amount)?)?;
                    }
                }
                other if other.starts_with('$') => {
                    return Err(invalid(format!("unsupported update operator {other}")));
                }
                _ => return Err(invalid("update document requires update operators")),
            }
        }

        Ok(())
    }

    fn increment(path: &str, current: Option<Bson>, amount: &Bson) -> DocumentStoreResult<Bson> {
        Ok(match (current, amount) {
            (None, amount) => amount.clone(),
            (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
                Some(sum) => Bson::Int32(sum),
                None => Bson::Int64(i64::from(a) + i64::from(*b)),
            },
            (Some(Bson::Int32(a)), Bson::Int64(b)) => Self::add_i64(path, i64::from(a), *b)?,
            (Some(Bson::Int64(a)), Bson::Int32(b)) => Self::add_i64(path, a, i64::from(*b))?,
            (Some(Bson::Int64(a)), Bson::Int64(b)) => Self::add_i64(path, a, *b)?,
            (Some(current), amount) => match (Comparable::from(&current), Comparable::from(amount)) {
                (Comparable::Number(a), Comparable::Number(b)) => Bson::Double(a + b),
                _ => return Err(invalid(format!("cannot apply $inc to non-numeric field '{path}'"))),
            },
        })
    }

    fn add_i64(path: &str, a: i64, b: i64) -> DocumentStoreResult<Bson> {
        a.checked_add(b)
            .map(Bson::Int64)
            .ok_or_else(|| invalid(format!("$inc overflows the 64-bit integer in field '{path}'")))
    }

    /// Builds the base document for an upsert from the equality conditions of `filter`.
    pub(crate) fn seed_from_filter(filter: &BsonDocument) -> DocumentStoreResult<BsonDocument> {
        let mut seed = BsonDocument::new();

        for (key, condition) in filter {
            if key.starts_with('$') {
                continue;
            }

            if !FilterEvaluator::is_operator_document(condition) {
                set_path(&mut seed, key, condition.clone())?;
            } else if let Some(value) = condition.as_document().and_then(|ops| ops.get("$eq")) {
                set_path(&mut seed, key, value.clone())?;
            }
        }

        Ok(seed)
    }
}

/// Applies an inclusion or exclusion projection.
pub(crate) fn project(document: &BsonDocument, projection: &BsonDocument) -> BsonDocument {
    let inclusive = projection
        .iter()
        .any(|(key, value)| key != "_id" && FilterEvaluator::truthy(value));
    let keep_id = projection
        .get("_id")
        .is_none_or(FilterEvaluator::truthy);

    if inclusive {
        let mut projected = BsonDocument::new();

        if keep_id {
            if let Some(id) = document.get("_id") {
                projected.insert("_id", id.clone());
            }
        }

        for (path, flag) in projection {
            if path == "_id" || !FilterEvaluator::truthy(flag) {
                continue;
            }
            if let Some(value) = lookup(document, path) {
                // Paths only fail on non-document parents, which a fresh document cannot have.
                let _ = set_path(&mut projected, path, value.clone());
            }
        }

        projected
    } else {
        let mut projected = document.clone();

        for (path, flag) in projection {
            if !FilterEvaluator::truthy(flag) {
                remove_path(&mut projected, path);
            }
        }

        projected
    }
}

/// Sorts documents by the keys of `sort`, `1` ascending and `-1` descending.
pub(crate) fn sort_documents(documents: &mut [BsonDocument], sort: &BsonDocument) {
    documents.sort_by(|a, b| {
        for (path, direction) in sort {
            let null = Bson::Null;
            let left = Comparable::from(lookup(a, path).unwrap_or(&null));
            let right = Comparable::from(lookup(b, path).unwrap_or(&null));

            let ordering = match Comparable::from(direction) {
                Comparable::Number(d) if d < 0.0 => right.sort_cmp(&left),
                _ => left.sort_cmp(&right),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

/// Key tuple used to enforce unique indexes; missing fields count as `null`.
pub(crate) fn same_key(a: &BsonDocument, b: &BsonDocument, fields: &[String]) -> bool {
    let null = Bson::Null;

    fields.iter().all(|field| {
        Comparable::from(lookup(a, field).unwrap_or(&null))
            == Comparable::from(lookup(b, field).unwrap_or(&null))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn user() -> BsonDocument {
        doc! {
            "name": "ada",
            "age": 36,
            "tags": ["math", "engines"],
            "profile": { "email": "ada@example.com" },
        }
    }

    #[test]
    fn matches_equality_and_dotted_paths() {
        let doc = user();
        assert!(FilterEvaluator::matches(&doc, &doc! { "name": "ada" }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "profile.email": "ada@example.com" }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "age": 36.0 }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "tags": "math" }).unwrap());
        assert!(!FilterEvaluator::matches(&doc, &doc! { "name": "grace" }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "missing": null }).unwrap());
    }

    #[test]
    fn matches_operators() {
        let doc = user();
        assert!(FilterEvaluator::matches(&doc, &doc! { "age": { "$gte": 36, "$lt": 40 } }).unwrap());
        assert!(!FilterEvaluator::matches(&doc, &doc! { "age": { "$gt": 36 } }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "name": { "$in": ["grace", "ada"] } }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "name": { "$nin": ["grace"] } }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "missing": { "$exists": false } }).unwrap());
        assert!(FilterEvaluator::matches(&doc, &doc! { "age": { "$not": { "$lt": 18 } } }).unwrap());
        assert!(FilterEvaluator::matches(
            &doc,
            &doc! { "$or": [ { "name": "grace" }, { "age": 36 } ] }
        )
        .unwrap());
        assert!(!FilterEvaluator::matches(&doc, &doc! { "$nor": [ { "name": "ada" } ] }).unwrap());
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(FilterEvaluator::matches(&user(), &doc! { "name": { "$regex": "a" } }).is_err());
        assert!(FilterEvaluator::matches(&user(), &doc! { "$where": "true" }).is_err());
    }

    #[test]
    fn applies_update_operators() {
        let mut doc = user();
        UpdateApplier::apply(
            &mut doc,
            &doc! {
                "$set": { "profile.verified": true },
                "$inc": { "age": 1, "logins": 1 },
                "$unset": { "tags": "" },
                "$setOnInsert": { "created": true },
            },
            false,
        )
        .unwrap();

        assert_eq!(lookup(&doc, "profile.verified"), Some(&Bson::Boolean(true)));
        assert_eq!(doc.get("age"), Some(&Bson::Int32(37)));
        assert_eq!(doc.get("logins"), Some(&Bson::Int32(1)));
        assert!(doc.get("tags").is_none());
        assert!(doc.get("created").is_none());
    }

    #[test]
    fn increment_widens_on_int32_overflow() {
        let mut doc = doc! { "n": i32::MAX, "m": i32::MIN };
        UpdateApplier::apply(&mut doc, &doc! { "$inc": { "n": 1, "m": -1 } }, false).unwrap();

        assert_eq!(doc.get("n"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(doc.get("m"), Some(&Bson::Int64(i64::from(i32::MIN) - 1)));
    }

    #[test]
    fn increment_rejects_int64_overflow() {
        let mut doc = doc! { "n": i64::MAX };
        let err = UpdateApplier::apply(&mut doc, &doc! { "$inc": { "n": 1 } }, false).unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        assert_eq!(doc.get("n"), Some(&Bson::Int64(i64::MAX)));
    }

    #[test]
    fn rejects_replacement_style_updates() {
        let mut doc = user();
        assert!(UpdateApplier::apply(&mut doc, &doc! { "name": "grace" }, false).is_err());
    }

    #[test]
    fn seeds_upserts_from_equality_conditions() {
        let seed = UpdateApplier::seed_from_filter(
            &doc! { "email": "x@example.com", "tenant": { "$eq": "acme" }, "age": { "$gt": 3 } },
        )
        .unwrap();
        assert_eq!(seed, doc! { "email": "x@example.com", "tenant": "acme" });
    }

    #[test]
    fn projects_inclusively_and_exclusively() {
        let doc = doc! { "_id": 1, "name": "ada", "age": 36, "profile": { "email": "e", "phone": "p" } };
        assert_eq!(project(&doc, &doc! { "name": 1 }), doc! { "_id": 1, "name": "ada" });
        assert_eq!(project(&doc, &doc! { "profile.email": 1, "_id": 0 }), doc! { "profile": { "email": "e" } });
        assert_eq!(
            project(&doc, &doc! { "age": 0, "profile": 0 }),
            doc! { "_id": 1, "name": "ada" }
        );
    }

    #[test]
    fn sorts_by_multiple_keys() {
        let mut docs = vec![
            doc! { "team": "b", "score": 1 },
            doc! { "team": "a", "score": 1 },
            doc! { "team": "a", "score": 5 },
            doc! { "score": 9 },
        ];
        sort_documents(&mut docs, &doc! { "team": 1, "score": -1 });

        let order = docs
            .iter()
            .map(|d| d.get_i32("score").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(order, vec![9, 5, 1, 1]);
        assert_eq!(docs[3].get_str("team").unwrap(), "b");
    }
}
