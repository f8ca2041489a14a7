//! 分群过滤树的数据模型
//!
//! 过滤树由分群编辑器以 JSON 形式构造并传入, 编译器只读取, 从不修改.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, WhitelistKind};

/// 主实体(联系人)表的叶子标签
pub const TABLE_CONTACTS: &str = "contacts";
/// 列表成员关系表的叶子标签
pub const TABLE_CONTACT_LISTS: &str = "contact_lists";
/// 时间线事件表的叶子标签
pub const TABLE_CONTACT_TIMELINE: &str = "contact_timeline";

/// 过滤树节点, 要么是分支, 要么是叶子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterTree {
    /// AND / OR 组合节点
    Branch(Branch),
    /// 针对单个表的条件节点
    Leaf(Leaf),
}

/// 分支节点, `operator` 缺省或为空时按 `and` 处理
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default)]
    pub children: Vec<FilterTree>,
}

/// 叶子节点, 必须且只能携带与 `table` 对应的那一个条件
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Leaf {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<EntityCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_list: Option<MembershipCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_timeline: Option<TimelineCondition>,
}

/// 联系人字段条件, 各过滤器之间隐式 AND
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityCondition {
    #[serde(default)]
    pub filters: Vec<DimensionFilter>,
}

/// 列表成员关系条件
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MembershipCondition {
    #[serde(default)]
    pub list_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// `in` / `not_in`, 缺省为 `in`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

/// 时间线事件计数条件
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimelineCondition {
    #[serde(default)]
    pub kind: String,
    /// `at_least` / `at_most` / `exactly`
    #[serde(default)]
    pub count_operator: String,
    #[serde(default)]
    pub count_value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe_operator: Option<String>,
    #[serde(default)]
    pub timeframe_values: Vec<String>,
    /// 作用于事件 metadata 的过滤器
    #[serde(default)]
    pub filters: Vec<DimensionFilter>,
}

/// 单个字段过滤器
///
/// 时间值以 RFC3339 或 `YYYY-MM-DD` 字符串放在 `string_values` 中.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    pub operator: String,
    #[serde(default)]
    pub string_values: Vec<String>,
    #[serde(default)]
    pub number_values: Vec<f64>,
}

/// 叶子解析后的条件, 封闭集合
#[derive(Debug, Clone, Copy)]
pub enum LeafCondition<'a> {
    Contacts(&'a EntityCondition),
    ContactLists(&'a MembershipCondition),
    ContactTimeline(&'a TimelineCondition),
}

impl FilterTree {
    pub fn and(children: Vec<FilterTree>) -> Self {
        FilterTree::Branch(Branch {
            operator: Some("and".to_string()),
            children,
        })
    }

    pub fn or(children: Vec<FilterTree>) -> Self {
        FilterTree::Branch(Branch {
            operator: Some("or".to_string()),
            children,
        })
    }

    pub fn contacts(filters: Vec<DimensionFilter>) -> Self {
        FilterTree::Leaf(Leaf {
            table: TABLE_CONTACTS.to_string(),
            contact: Some(EntityCondition { filters }),
            ..Default::default()
        })
    }

    pub fn membership(condition: MembershipCondition) -> Self {
        FilterTree::Leaf(Leaf {
            table: TABLE_CONTACT_LISTS.to_string(),
            contact_list: Some(condition),
            ..Default::default()
        })
    }

    pub fn timeline(condition: TimelineCondition) -> Self {
        FilterTree::Leaf(Leaf {
            table: TABLE_CONTACT_TIMELINE.to_string(),
            contact_timeline: Some(condition),
            ..Default::default()
        })
    }

    /// 树的最大深度, 单个叶子为 1
    pub fn depth(&self) -> usize {
        let mut stack = vec![(self, 1usize)];
        let mut max = 0;
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            if let FilterTree::Branch(branch) = node {
                stack.extend(branch.children.iter().map(|child| (child, depth + 1)));
            }
        }
        max
    }

    /// 节点总数(分支与叶子)
    pub fn node_count(&self) -> usize {
        let mut stack = vec![self];
        let mut count = 0;
        while let Some(node) = stack.pop() {
            count += 1;
            if let FilterTree::Branch(branch) = node {
                stack.extend(branch.children.iter());
            }
        }
        count
    }
}

impl Leaf {
    /// 按 `table` 取出唯一匹配的条件
    pub fn condition(&self) -> Result<LeafCondition<'_>, CompileError> {
        let populated = [
            self.contact.is_some(),
            self.contact_list.is_some(),
            self.contact_timeline.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if populated > 1 {
            return Err(CompileError::structural(format!(
                "leaf for table `{}` carries {} condition payloads, expected exactly one",
                self.table, populated
            )));
        }

        let missing = |payload: &str| {
            CompileError::structural(format!(
                "leaf for table `{}` has no `{}` payload",
                self.table, payload
            ))
        };

        match self.table.as_str() {
            TABLE_CONTACTS => self
                .contact
                .as_ref()
                .map(LeafCondition::Contacts)
                .ok_or_else(|| missing("contact")),
            TABLE_CONTACT_LISTS => self
                .contact_list
                .as_ref()
                .map(LeafCondition::ContactLists)
                .ok_or_else(|| missing("contact_list")),
            TABLE_CONTACT_TIMELINE => self
                .contact_timeline
                .as_ref()
                .map(LeafCondition::ContactTimeline)
                .ok_or_else(|| missing("contact_timeline")),
            other => Err(CompileError::not_allowed(WhitelistKind::Table, other)),
        }
    }
}

impl DimensionFilter {
    pub fn new(field_name: &str, operator: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            operator: operator.to_string(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, field_type: &str) -> Self {
        self.field_type = Some(field_type.to_string());
        self
    }

    pub fn with_strings<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.string_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_numbers<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        self.number_values = values.into_iter().collect();
        self
    }
}
