//! 事件过滤器（EventFilter）
//!
//! 以“事件类型 → 属性列表”的映射声明消费者关心的事件：
//! - 空过滤器匹配所有事件；
//! - 存在类型键 `*` 时任意类型都按该条目的属性列表判断（忽略精确类型条目）；
//! - 属性列表为空或包含 `*` 时匹配该类型的所有属性。
//!
use crate::event::Event;
use std::collections::{BTreeMap, BTreeSet};

/// 通配符
pub const WILDCARD: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeFilter {
    Any,
    Only(BTreeSet<String>),
}

impl AttributeFilter {
    fn from_list<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = attributes.into_iter().map(Into::into).collect();
        if set.is_empty() || set.contains(WILDCARD) {
            Self::Any
        } else {
            Self::Only(set)
        }
    }

    fn accepts(&self, attribute_name: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => attribute_name.is_some_and(|name| set.contains(name)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    types: BTreeMap<String, AttributeFilter>,
}

impl EventFilter {
    /// 匹配所有事件
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_map<I, K, A, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = (K, A)>,
        K: Into<String>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        filters
            .into_iter()
            .fold(Self::default(), |f, (ty, attrs)| f.with_type(ty, attrs))
    }

    pub fn with_type<K, A, S>(mut self, event_type: K, attributes: A) -> Self
    where
        K: Into<String>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types
            .insert(event_type.into(), AttributeFilter::from_list(attributes));
        self
    }

    pub fn is_all(&self) -> bool {
        self.types.is_empty()
    }

    pub fn matches(&self, event: &Event) -> bool {
        if self.types.is_empty() {
            return true;
        }

        // 存在 `*` 键时只看该条目的属性列表
        let Some(attributes) = self
            .types
            .get(WILDCARD)
            .or_else(|| self.types.get(event.event_type()))
        else {
            return false;
        };

        attributes.accepts(event.attribute_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(ty: &str, attr: Option<&str>) -> Event {
        Event::builder()
            .id(1)
            .event_type(ty)
            .maybe_attribute_name(attr)
            .build()
    }

    #[test]
    fn filter_table() {
        let no_filter = EventFilter::all();
        let wildcard_type = EventFilter::all().with_type(WILDCARD, Vec::<String>::new());
        let specific = EventFilter::all().with_type("Task_Change", ["status"]);
        let no_attr_list = EventFilter::all().with_type("Task_Change", Vec::<String>::new());
        let star_attr = EventFilter::all().with_type("Task_Change", ["*"]);

        let cases: Vec<(&str, &EventFilter, Event, bool)> = vec![
            ("no filter", &no_filter, ev("Anything", None), true),
            ("wildcard type", &wildcard_type, ev("Shot_New", Some("code")), true),
            ("specific type+attr", &specific, ev("Task_Change", Some("status")), true),
            ("specific type wrong attr", &specific, ev("Task_Change", Some("due")), false),
            ("specific type missing attr", &specific, ev("Task_Change", None), false),
            ("specific type other type", &specific, ev("Shot_Change", Some("status")), false),
            ("no attr list", &no_attr_list, ev("Task_Change", Some("due")), true),
            ("no attr list, no attr", &no_attr_list, ev("Task_Change", None), true),
            ("star attr", &star_attr, ev("Task_Change", Some("anything")), true),
        ];

        for (name, filter, event, expected) in cases {
            assert_eq!(filter.matches(&event), expected, "case: {name}");
        }
    }

    #[test]
    fn wildcard_entry_overrides_exact_type() {
        let f = EventFilter::from_map([
            ("*", vec!["code"]),
            ("Task_Change", vec!["status"]),
        ]);
        assert!(!f.matches(&ev("Task_Change", Some("status"))));
        assert!(f.matches(&ev("Task_Change", Some("code"))));
        assert!(f.matches(&ev("Shot_Change", Some("code"))));
        assert!(!f.matches(&ev("Shot_Change", Some("status"))));

        let any = EventFilter::from_map([("*", vec![]), ("Task_Change", vec!["status"])]);
        assert!(any.matches(&ev("Task_Change", Some("due"))));
        assert!(any.matches(&ev("Shot_New", None)));
    }

    #[test]
    fn from_map_normalizes_attribute_lists() {
        let f = EventFilter::from_map([("A", vec![]), ("B", vec!["x", "*"])]);
        assert!(!f.is_all());
        assert!(f.matches(&ev("A", Some("whatever"))));
        assert!(f.matches(&ev("B", None)));
    }
}
