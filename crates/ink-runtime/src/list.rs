use std::collections::{BTreeMap, HashMap};
use std::fmt;

use ink_core::InkError;

use crate::value::Value;

/// One element of a list definition, identified by origin and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InkListItem {
    pub origin_name: String,
    pub item_name: String,
}

impl InkListItem {
    pub fn new(origin_name: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self {
            origin_name: origin_name.into(),
            item_name: item_name.into(),
        }
    }

    /// Parses `origin.item`; a bare name leaves the origin empty.
    pub fn from_full_name(full_name: &str) -> Self {
        match full_name.split_once('.') {
            Some((origin, item)) => Self::new(origin, item),
            None => Self::new("", full_name),
        }
    }

    pub fn full_name(&self) -> String {
        if self.origin_name.is_empty() {
            format!("?.{}", self.item_name)
        } else {
            format!("{}.{}", self.origin_name, self.item_name)
        }
    }
}

/// A set of list items with their integer values. Equality ignores origins
/// and values and compares the item sets only.
#[derive(Debug, Clone, Default)]
pub struct InkList {
    items: BTreeMap<InkListItem, i32>,
    /// Origins remembered for an empty list so `LIST_ALL` still works.
    origin_names: Vec<String>,
}

impl PartialEq for InkList {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self.items.keys().all(|item| other.items.contains_key(item))
    }
}

impl InkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_single_item(item: InkListItem, value: i32) -> Self {
        let mut list = Self::new();
        list.insert(item, value);
        list
    }

    /// The item of `origin` holding `value`, or an empty list tied to it.
    pub fn from_origin_value(origin: &ListDefinition, value: i32) -> Self {
        let mut list = Self::new();
        match origin.item_with_value(value) {
            Some(item) => list.insert(item, value),
            None => list.set_initial_origin_names(vec![origin.name.clone()]),
        }
        list
    }

    pub fn insert(&mut self, item: InkListItem, value: i32) {
        self.items.insert(item, value);
    }

    pub fn remove(&mut self, item: &InkListItem) -> Option<i32> {
        self.items.remove(item)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> impl Iterator<Item = (&InkListItem, i32)> {
        self.items.iter().map(|(item, value)| (item, *value))
    }

    pub fn contains_item(&self, item: &InkListItem) -> bool {
        self.items.contains_key(item)
    }

    pub fn contains_item_named(&self, item_name: &str) -> bool {
        self.items.keys().any(|item| item.item_name == item_name)
    }

    pub fn value_of(&self, item: &InkListItem) -> Option<i32> {
        self.items.get(item).copied()
    }

    pub fn origin_names(&self) -> Vec<String> {
        if self.items.is_empty() {
            return self.origin_names.clone();
        }
        let mut names: Vec<String> = Vec::new();
        for item in self.items.keys() {
            if !names.contains(&item.origin_name) {
                names.push(item.origin_name.clone());
            }
        }
        names
    }

    pub fn set_initial_origin_names(&mut self, names: Vec<String>) {
        self.origin_names = names;
    }

    pub fn max_item(&self) -> Option<(&InkListItem, i32)> {
        let mut best: Option<(&InkListItem, i32)> = None;
        for (item, value) in self.items() {
            if best.map_or(true, |(_, best_value)| value > best_value) {
                best = Some((item, value));
            }
        }
        best
    }

    pub fn min_item(&self) -> Option<(&InkListItem, i32)> {
        let mut best: Option<(&InkListItem, i32)> = None;
        for (item, value) in self.items() {
            if best.map_or(true, |(_, best_value)| value < best_value) {
                best = Some((item, value));
            }
        }
        best
    }

    pub fn single_item(&self) -> Option<(&InkListItem, i32)> {
        if self.items.len() == 1 {
            self.items().next()
        } else {
            None
        }
    }

    /// Items ordered by value, ties broken by origin name.
    pub fn ordered_items(&self) -> Vec<(&InkListItem, i32)> {
        let mut ordered: Vec<_> = self.items().collect();
        ordered.sort_by(|(a_item, a_value), (b_item, b_value)| {
            a_value
                .cmp(b_value)
                .then_with(|| a_item.origin_name.cmp(&b_item.origin_name))
        });
        ordered
    }

    pub fn union(&self, other: &InkList) -> InkList {
        let mut union = self.clone();
        for (item, value) in other.items() {
            union.items.insert(item.clone(), value);
        }
        union
    }

    pub fn intersect(&self, other: &InkList) -> InkList {
        let mut intersection = InkList::new();
        for (item, value) in self.items() {
            if other.contains_item(item) {
                intersection.items.insert(item.clone(), value);
            }
        }
        intersection
    }

    pub fn has_intersection(&self, other: &InkList) -> bool {
        self.items.keys().any(|item| other.contains_item(item))
    }

    pub fn without(&self, other: &InkList) -> InkList {
        let mut result = self.clone();
        for item in other.items.keys() {
            result.items.remove(item);
        }
        result
    }

    /// True when every item of `other` is present; never true for empty lists.
    pub fn contains(&self, other: &InkList) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        other.items.keys().all(|item| self.contains_item(item))
    }

    pub fn greater_than(&self, other: &InkList) -> bool {
        match (self.min_item(), other.max_item()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some((_, min)), Some((_, other_max))) => min > other_max,
        }
    }

    pub fn greater_than_or_equals(&self, other: &InkList) -> bool {
        if self.is_empty() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        let (min, max) = self.bounds();
        let (other_min, other_max) = other.bounds();
        min >= other_min && max >= other_max
    }

    pub fn less_than(&self, other: &InkList) -> bool {
        match (self.max_item(), other.min_item()) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some((_, max)), Some((_, other_min))) => max < other_min,
        }
    }

    pub fn less_than_or_equals(&self, other: &InkList) -> bool {
        if other.is_empty() {
            return false;
        }
        if self.is_empty() {
            return true;
        }
        let (min, max) = self.bounds();
        let (other_min, other_max) = other.bounds();
        max <= other_max && min <= other_min
    }

    fn bounds(&self) -> (i32, i32) {
        let min = self.min_item().map(|(_, value)| value).unwrap_or(0);
        let max = self.max_item().map(|(_, value)| value).unwrap_or(0);
        (min, max)
    }

    /// Every item of this list's origins that is not in the list.
    pub fn inverse(&self, definitions: &ListDefinitionsOrigin) -> InkList {
        let mut inverse = InkList::new();
        for origin in self.origins(definitions) {
            for (item_name, value) in &origin.items {
                let item = InkListItem::new(origin.name.clone(), item_name.clone());
                if !self.contains_item(&item) {
                    inverse.items.insert(item, *value);
                }
            }
        }
        inverse.origin_names = self.origin_names();
        inverse
    }

    /// Every item of this list's origins.
    pub fn all(&self, definitions: &ListDefinitionsOrigin) -> InkList {
        let mut all = InkList::new();
        for origin in self.origins(definitions) {
            for (item_name, value) in &origin.items {
                all.items
                    .insert(InkListItem::new(origin.name.clone(), item_name.clone()), *value);
            }
        }
        all.origin_names = self.origin_names();
        all
    }

    pub fn origins<'a>(&self, definitions: &'a ListDefinitionsOrigin) -> Vec<&'a ListDefinition> {
        self.origin_names()
            .iter()
            .filter_map(|name| definitions.list_definition(name))
            .collect()
    }

    /// Items whose values fall within the bounds. A bound is an int or a
    /// list, in which case its min or max item value is used.
    pub fn list_with_sub_range(&self, min_bound: &Value, max_bound: &Value) -> Result<InkList, InkError> {
        let mut sub_list = InkList::new();
        sub_list.set_initial_origin_names(self.origin_names());
        if self.is_empty() {
            return Ok(sub_list);
        }

        let min_value = match min_bound {
            Value::Int(value) => *value,
            Value::List(list) => list.min_item().map(|(_, value)| value).unwrap_or(0),
            other => return Err(range_bound_error(other)),
        };
        let max_value = match max_bound {
            Value::Int(value) => *value,
            Value::List(list) => list.max_item().map(|(_, value)| value).unwrap_or(i32::MAX),
            other => return Err(range_bound_error(other)),
        };

        for (item, value) in self.ordered_items() {
            if value >= min_value && value <= max_value {
                sub_list.items.insert(item.clone(), value);
            }
        }
        Ok(sub_list)
    }
}

fn range_bound_error(bound: &Value) -> InkError {
    InkError::new(
        "LIST_RANGE_BOUND",
        format!(
            "List range bounds must be ints or lists, got {}",
            bound.value_type()
        ),
    )
}

impl fmt::Display for InkList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .ordered_items()
            .into_iter()
            .map(|(item, _)| item.item_name.as_str())
            .collect::<Vec<_>>();
        write!(f, "{}", names.join(", "))
    }
}

/// A declared list: item names with their values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListDefinition {
    pub name: String,
    pub items: BTreeMap<String, i32>,
}

impl ListDefinition {
    pub fn new(name: impl Into<String>, items: BTreeMap<String, i32>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn item_with_value(&self, value: i32) -> Option<InkListItem> {
        self.items
            .iter()
            .find(|(_, item_value)| **item_value == value)
            .map(|(item_name, _)| InkListItem::new(self.name.clone(), item_name.clone()))
    }

    pub fn value_for_item(&self, item: &InkListItem) -> Option<i32> {
        self.items.get(&item.item_name).copied()
    }

    pub fn contains_item(&self, item: &InkListItem) -> bool {
        item.origin_name == self.name && self.items.contains_key(&item.item_name)
    }
}

/// Every list definition of a story, with a lookup from item names.
#[derive(Debug, Clone, Default)]
pub struct ListDefinitionsOrigin {
    lists: BTreeMap<String, ListDefinition>,
    single_items: HashMap<String, (InkListItem, i32)>,
}

impl ListDefinitionsOrigin {
    pub fn new(lists: Vec<ListDefinition>) -> Self {
        let mut origin = Self::default();
        for list in lists {
            for (item_name, value) in &list.items {
                let item = InkListItem::new(list.name.clone(), item_name.clone());
                // Item names may collide across lists; the later list wins.
                origin
                    .single_items
                    .insert(item_name.clone(), (item.clone(), *value));
                origin.single_items.insert(item.full_name(), (item, *value));
            }
            origin.lists.insert(list.name.clone(), list);
        }
        origin
    }

    pub fn lists(&self) -> impl Iterator<Item = &ListDefinition> {
        self.lists.values()
    }

    pub fn list_definition(&self, name: &str) -> Option<&ListDefinition> {
        self.lists.get(name)
    }

    /// Resolves `item` or `list.item` to a one-element list.
    pub fn find_single_item_list_with_name(&self, name: &str) -> Option<InkList> {
        self.single_items
            .get(name)
            .map(|(item, value)| InkList::from_single_item(item.clone(), *value))
    }
}

/// Keeps an empty list tied to the origins of the value it replaces.
pub fn retain_list_origins_for_assignment(old: Option<&Value>, new: &mut Value) {
    if let (Some(Value::List(old_list)), Value::List(new_list)) = (old, new) {
        if new_list.is_empty() {
            new_list.set_initial_origin_names(old_list.origin_names());
        }
    }
}

#[cfg(test)]
mod list_tests {
    use super::*;

    fn colours() -> ListDefinitionsOrigin {
        let items = [("red", 1), ("green", 2), ("blue", 3)]
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        let sizes = [("small", 1), ("large", 2)]
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        ListDefinitionsOrigin::new(vec![
            ListDefinition::new("colours", items),
            ListDefinition::new("sizes", sizes),
        ])
    }

    fn list_of(definitions: &ListDefinitionsOrigin, names: &[&str]) -> InkList {
        let mut list = InkList::new();
        for name in names {
            let single = definitions
                .find_single_item_list_with_name(name)
                .expect("known item");
            list = list.union(&single);
        }
        list
    }

    #[test]
    fn set_operations_behave_like_sets() {
        let defs = colours();
        let warm = list_of(&defs, &["red", "green"]);
        let cool = list_of(&defs, &["green", "blue"]);

        assert_eq!(warm.union(&cool), list_of(&defs, &["red", "green", "blue"]));
        assert_eq!(warm.intersect(&cool), list_of(&defs, &["green"]));
        assert_eq!(warm.without(&cool), list_of(&defs, &["red"]));
        assert!(warm.has_intersection(&cool));
        assert!(warm.contains(&list_of(&defs, &["red"])));
        assert!(!warm.contains(&InkList::new()));
        assert!(!InkList::new().contains(&InkList::new()));
    }

    #[test]
    fn comparisons_use_min_and_max_values() {
        let defs = colours();
        let low = list_of(&defs, &["red"]);
        let high = list_of(&defs, &["green", "blue"]);
        let empty = InkList::new();

        assert!(high.greater_than(&low));
        assert!(!low.greater_than(&high));
        assert!(low.less_than(&high));
        assert!(high.greater_than_or_equals(&low));
        assert!(low.less_than_or_equals(&high));
        assert!(low.greater_than(&empty));
        assert!(!empty.greater_than(&low));
        assert!(empty.less_than(&low));
        assert!(!low.less_than(&empty));
    }

    #[test]
    fn inverse_and_all_use_origins_even_when_empty() {
        let defs = colours();
        let red = list_of(&defs, &["red"]);
        assert_eq!(red.inverse(&defs), list_of(&defs, &["green", "blue"]));
        assert_eq!(red.all(&defs), list_of(&defs, &["red", "green", "blue"]));

        let mut empty = InkList::new();
        empty.set_initial_origin_names(vec!["sizes".to_string()]);
        assert_eq!(empty.all(&defs), list_of(&defs, &["small", "large"]));
    }

    #[test]
    fn sub_range_accepts_int_and_list_bounds() {
        let defs = colours();
        let all = list_of(&defs, &["red", "green", "blue"]);
        let ranged = all
            .list_with_sub_range(&Value::Int(2), &Value::Int(5))
            .expect("int bounds");
        assert_eq!(ranged, list_of(&defs, &["green", "blue"]));

        let bounds = Value::List(list_of(&defs, &["red", "green"]));
        let ranged = all
            .list_with_sub_range(&bounds, &bounds)
            .expect("list bounds");
        assert_eq!(ranged, list_of(&defs, &["red", "green"]));

        let error = all
            .list_with_sub_range(&Value::Float(1.0), &Value::Int(2))
            .expect_err("float bound");
        assert_eq!(error.code, "LIST_RANGE_BOUND");
    }

    #[test]
    fn display_orders_by_value() {
        let defs = colours();
        let list = list_of(&defs, &["blue", "red", "large"]);
        assert_eq!(list.to_string(), "red, large, blue");
        assert_eq!(
            list.max_item().map(|(item, _)| item.full_name()),
            Some("colours.blue".to_string())
        );
        assert_eq!(list.origin_names(), vec!["colours".to_string(), "sizes".to_string()]);
    }

    #[test]
    fn empty_assignment_keeps_previous_origins() {
        let defs = colours();
        let old = Value::List(list_of(&defs, &["red"]));
        let mut new = Value::List(InkList::new());
        retain_list_origins_for_assignment(Some(&old), &mut new);
        let list = new.as_list().expect("list value");
        assert_eq!(list.origin_names(), vec!["colours".to_string()]);
    }
}
