//! Partitioning of result records into ordered buckets.
//!
//! [`group_by_key`] is the typed core: any `K: Ord` key works and buckets
//! come back in ascending key order. [`group_by`] layers the dynamic form
//! on top of it, where the key is read from a named field or produced by a
//! function and lands in a [`GroupKey`].

use crate::record::WordRecord;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// Buckets of records keyed by a derived value, iterated in ascending key order.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouped<K, R> {
    buckets: BTreeMap<K, Vec<R>>,
}

impl<K: Ord, R> Grouped<K, R> {
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }

    fn push(&mut self, key: K, record: R) {
        self.buckets.entry(key).or_default().push(record);
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&[R]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.buckets.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[R])> + '_ {
        self.buckets
            .iter()
            .map(|(key, bucket)| (key, bucket.as_slice()))
    }

    /// Total number of records across all buckets.
    pub fn total_records(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

impl<K: Ord, R> Default for Grouped<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, R> IntoIterator for Grouped<K, R> {
    type Item = (K, Vec<R>);
    type IntoIter = btree_map::IntoIter<K, Vec<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

impl<K: fmt::Display, R: Serialize> Serialize for Grouped<K, R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (key, bucket) in &self.buckets {
            map.serialize_entry(&key.to_string(), bucket)?;
        }
        map.end()
    }
}

/// Groups `records` by the key `key_fn` derives from each one.
///
/// Records sharing a key keep the order they were supplied in.
pub fn group_by_key<I, K, F>(records: I, mut key_fn: F) -> Grouped<K, I::Item>
where
    I: IntoIterator,
    K: Ord,
    F: FnMut(&I::Item) -> K,
{
    let mut grouped = Grouped::new();
    for record in records {
        let key = key_fn(&record);
        grouped.push(key, record);
    }
    grouped
}

/// Groups `records` using a field name or a key function.
pub fn group_by<'a, I>(
    records: I,
    selector: KeySelector<'a, I::Item>,
) -> Grouped<GroupKey, I::Item>
where
    I: IntoIterator,
    I::Item: FieldValue,
{
    let key_fn = selector.resolve();
    group_by_key(records, |record| key_fn(record))
}

/// Returns the plural suffix for `count`: empty for exactly one, `s` otherwise.
pub fn pluralize(count: u64) -> &'static str {
    if count == 1 { "" } else { "s" }
}

/// How a group key is derived from a record.
pub enum KeySelector<'a, R> {
    /// Read the record's value at this field.
    Field(&'a str),
    /// Compute the key from the whole record.
    Func(Box<dyn Fn(&R) -> GroupKey + 'a>),
}

impl<'a, R: FieldValue> KeySelector<'a, R> {
    pub fn field(name: &'a str) -> Self {
        KeySelector::Field(name)
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&R) -> GroupKey + 'a,
    {
        KeySelector::Func(Box::new(f))
    }

    fn resolve(self) -> Box<dyn Fn(&R) -> GroupKey + 'a> {
        match self {
            KeySelector::Field(name) => Box::new(move |record: &R| record.field(name)),
            KeySelector::Func(f) => f,
        }
    }
}

impl<'a, R> From<&'a str> for KeySelector<'a, R> {
    fn from(name: &'a str) -> Self {
        KeySelector::Field(name)
    }
}

/// Records whose fields can be read by name.
pub trait FieldValue {
    /// Value at `name`, or [`GroupKey::Undefined`] when the field is absent.
    fn field(&self, name: &str) -> GroupKey;
}

impl FieldValue for serde_json::Value {
    fn field(&self, name: &str) -> GroupKey {
        self.get(name)
            .map(GroupKey::from)
            .unwrap_or(GroupKey::Undefined)
    }
}

impl FieldValue for WordRecord {
    fn field(&self, name: &str) -> GroupKey {
        match name {
            "word" => GroupKey::from(self.word.as_str()),
            "score" => self.score.map(GroupKey::from).unwrap_or(GroupKey::Undefined),
            "numSyllables" => self
                .num_syllables
                .map(GroupKey::from)
                .unwrap_or(GroupKey::Undefined),
            "tags" if !self.tags.is_empty() => GroupKey::Text(self.tags.join(",")),
            other => self
                .extra
                .get(other)
                .map(GroupKey::from)
                .unwrap_or(GroupKey::Undefined),
        }
    }
}

impl<T: FieldValue> FieldValue for &T {
    fn field(&self, name: &str) -> GroupKey {
        (**self).field(name)
    }
}

/// Dynamically typed group key.
///
/// Within one variant the ordering is the natural one (numeric for numbers,
/// lexicographic for text). Keys of different variants order by variant:
/// booleans, numbers, text, null, then `Undefined` last.
#[derive(Debug, Clone)]
pub enum GroupKey {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
    Undefined,
}

impl GroupKey {
    fn rank(&self) -> u8 {
        match self {
            GroupKey::Bool(_) => 0,
            GroupKey::Number(_) => 1,
            GroupKey::Text(_) => 2,
            GroupKey::Null => 3,
            GroupKey::Undefined => 4,
        }
    }

    /// Integer value of a numeric key, if it has no fractional part.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            GroupKey::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u64),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, GroupKey::Undefined)
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupKey::Bool(a), GroupKey::Bool(b)) => a.cmp(b),
            // -0.0 and 0.0 are the same key.
            (GroupKey::Number(a), GroupKey::Number(b)) if a == b => Ordering::Equal,
            (GroupKey::Number(a), GroupKey::Number(b)) => a.total_cmp(b),
            (GroupKey::Text(a), GroupKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Bool(value) => write!(f, "{value}"),
            GroupKey::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            GroupKey::Number(n) => write!(f, "{n}"),
            GroupKey::Text(text) => f.write_str(text),
            GroupKey::Null => f.write_str("null"),
            GroupKey::Undefined => f.write_str("undefined"),
        }
    }
}

impl From<&serde_json::Value> for GroupKey {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => GroupKey::Null,
            Value::Bool(b) => GroupKey::Bool(*b),
            Value::Number(n) => n.as_f64().map(GroupKey::Number).unwrap_or(GroupKey::Null),
            Value::String(s) => GroupKey::Text(s.clone()),
            other => GroupKey::Text(other.to_string()),
        }
    }
}

impl From<&str> for GroupKey {
    fn from(value: &str) -> Self {
        GroupKey::Text(value.to_string())
    }
}

impl From<String> for GroupKey {
    fn from(value: String) -> Self {
        GroupKey::Text(value)
    }
}

impl From<bool> for GroupKey {
    fn from(value: bool) -> Self {
        GroupKey::Bool(value)
    }
}

macro_rules! numeric_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for GroupKey {
                fn from(value: $ty) -> Self {
                    GroupKey::Number(value as f64)
                }
            }
        )*
    };
}

numeric_key!(i32, i64, u32, u64, usize, f64);

impl<T: Into<GroupKey>> From<Option<T>> for GroupKey {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(GroupKey::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn keys_of<K: Clone + Ord, R>(grouped: &Grouped<K, R>) -> Vec<K> {
        grouped.keys().cloned().collect()
    }

    #[test]
    fn empty_input_yields_empty_mapping() {
        let grouped = group_by(Vec::<Value>::new(), KeySelector::field("team"));
        assert!(grouped.is_empty());
        assert_eq!(grouped.total_records(), 0);
    }

    #[test]
    fn buckets_iterate_in_ascending_key_order() {
        let records = vec![json!({"team": "red"}), json!({"team": "blue"})];
        let grouped = group_by(records, KeySelector::field("team"));
        assert_eq!(keys_of(&grouped), vec![GroupKey::from("blue"), GroupKey::from("red")]);
    }

    #[test]
    fn groups_by_field_preserving_input_order() {
        let records = vec![
            json!({"name": "Steve", "team": "blue"}),
            json!({"name": "Jack", "team": "red"}),
            json!({"name": "Carol", "team": "blue"}),
        ];
        let grouped = group_by(records, "team".into());
        assert_eq!(
            serde_json::to_value(&grouped).unwrap(),
            json!({
                "blue": [{"name": "Steve", "team": "blue"}, {"name": "Carol", "team": "blue"}],
                "red": [{"name": "Jack", "team": "red"}],
            })
        );
        let blue = grouped.get(&GroupKey::from("blue")).unwrap();
        assert_eq!(blue[0]["name"], "Steve");
        assert_eq!(blue[1]["name"], "Carol");
    }

    #[test]
    fn groups_by_function_with_numeric_keys() {
        let records = vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})];
        let grouped = group_by(
            records,
            KeySelector::func(|obj: &Value| GroupKey::from(obj["n"].as_i64().unwrap_or(0) % 2)),
        );
        let buckets: Vec<(String, Vec<Value>)> = grouped
            .into_iter()
            .map(|(key, bucket)| (key.to_string(), bucket))
            .collect();
        assert_eq!(
            buckets,
            vec![
                ("0".to_string(), vec![json!({"n": 2})]),
                ("1".to_string(), vec![json!({"n": 1}), json!({"n": 3})]),
            ]
        );
    }

    #[test]
    fn numeric_keys_sort_numerically_not_lexically() {
        let records: Vec<Value> = [10, 2, 1, 2].iter().map(|n| json!({"syl": n})).collect();
        let grouped = group_by(records, KeySelector::field("syl"));
        let keys: Vec<String> = grouped.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["1", "2", "10"]);
        assert_eq!(grouped.get(&GroupKey::from(2)).map(<[Value]>::len), Some(2));
    }

    #[test]
    fn equal_numbers_share_a_bucket_regardless_of_representation() {
        let records = vec![json!({"n": 1}), json!({"n": 1.0})];
        let grouped = group_by(records, KeySelector::field("n"));
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.total_records(), 2);
    }

    #[test]
    fn missing_fields_group_under_undefined_last() {
        let records = vec![
            json!({"word": "a"}),
            json!({"word": "b", "n": 2}),
            json!({"word": "c"}),
        ];
        let grouped = group_by(records, KeySelector::field("n"));
        let keys = keys_of(&grouped);
        assert_eq!(keys, vec![GroupKey::Number(2.0), GroupKey::Undefined]);
        let undefined = grouped.get(&GroupKey::Undefined).unwrap();
        assert_eq!(undefined.len(), 2);
        assert_eq!(undefined[0]["word"], "a");
        assert_eq!(undefined[1]["word"], "c");
    }

    #[test]
    fn every_record_lands_in_exactly_one_bucket() {
        let records: Vec<Value> = (0..37).map(|i| json!({"i": i, "k": i % 5})).collect();
        let grouped = group_by(records.clone(), KeySelector::field("k"));
        assert_eq!(grouped.total_records(), records.len());
        let mut seen: Vec<i64> = grouped
            .iter()
            .flat_map(|(_, bucket)| bucket.iter().map(|r| r["i"].as_i64().unwrap()))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..37).collect::<Vec<i64>>());
        for (_, bucket) in grouped.iter() {
            let order: Vec<i64> = bucket.iter().map(|r| r["i"].as_i64().unwrap()).collect();
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(order, sorted, "buckets must keep input order");
        }
    }

    #[test]
    fn typed_grouping_accepts_any_ord_key() {
        let words = ["bat", "at", "cat", "splat"];
        let grouped = group_by_key(words, |word| word.len());
        let rows: Vec<(usize, Vec<&str>)> = grouped.into_iter().collect();
        assert_eq!(rows, vec![(2, vec!["at"]), (3, vec!["bat", "cat"]), (5, vec!["splat"])]);
    }

    #[test]
    fn word_records_expose_known_and_extra_fields() {
        let mut record = WordRecord::new("cat").with_syllables(1);
        record.extra.insert("defs".into(), json!("feline"));
        assert_eq!(record.field("numSyllables"), GroupKey::Number(1.0));
        assert_eq!(record.field("word"), GroupKey::from("cat"));
        assert_eq!(record.field("defs"), GroupKey::from("feline"));
        assert!(record.field("score").is_undefined());
    }

    #[test]
    fn pluralize_only_singular_for_one() {
        assert_eq!(pluralize(1), "");
        assert_eq!(pluralize(0), "s");
        assert_eq!(pluralize(2), "s");
        assert_eq!(pluralize(17), "s");
    }
}
