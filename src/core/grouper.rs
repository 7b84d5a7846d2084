use crate::domain::model::Layer;
use crate::utils::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// 群組鍵：字串區分大小寫，數字依數值比較，不做跨型別轉換，NULL 自成一組
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Null,
    Bool(bool),
    /// 整數值 (含小數部分為零的浮點數)，精確比較
    Integer(i128),
    /// 其他浮點數的位元表示
    Number(u64),
    Text(String),
}

impl GroupKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => GroupKey::Null,
            Value::Bool(b) => GroupKey::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return GroupKey::Integer(i128::from(i));
                }
                if let Some(u) = n.as_u64() {
                    return GroupKey::Integer(i128::from(u));
                }
                let v = n.as_f64().unwrap_or(0.0);
                // 1.0 與 1 同組；-0.0 也落在 Integer(0)
                if v.fract() == 0.0 && v.abs() < i128::MAX as f64 {
                    GroupKey::Integer(v as i128)
                } else {
                    GroupKey::Number(v.to_bits())
                }
            }
            Value::String(s) => GroupKey::Text(s.clone()),
            other => GroupKey::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, GroupKey::Null)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Null => f.write_str("NULL"),
            GroupKey::Bool(b) => write!(f, "{}", b),
            GroupKey::Integer(i) => write!(f, "{}", i),
            GroupKey::Number(bits) => write!(f, "{}", f64::from_bits(*bits)),
            GroupKey::Text(s) => f.write_str(s),
        }
    }
}

/// 一個群組：同一鍵值的點子集與線子集
#[derive(Debug, Clone)]
pub struct Group {
    pub key: GroupKey,
    pub points: Layer,
    pub lines: Layer,
}

/// 單次掃描建立的分組索引：鍵值對應到點索引與線索引
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    keys: Vec<GroupKey>,
    points: Vec<Vec<usize>>,
    lines: HashMap<GroupKey, Vec<usize>>,
}

impl GroupIndex {
    pub fn build(points: &Layer, lines: &Layer, point_field: &str, line_field: &str) -> Result<Self> {
        let point_index = points.field_index(point_field)?;
        let line_index = lines.field_index(line_field)?;

        let mut index = GroupIndex::default();
        let mut slots: HashMap<GroupKey, usize> = HashMap::new();

        for (i, feature) in points.features.iter().enumerate() {
            let key = GroupKey::from_value(feature.attribute(point_index));
            let slot = *slots.entry(key.clone()).or_insert_with(|| {
                index.keys.push(key);
                index.points.push(Vec::new());
                index.keys.len() - 1
            });
            index.points[slot].push(i);
        }

        for (i, feature) in lines.features.iter().enumerate() {
            let key = GroupKey::from_value(feature.attribute(line_index));
            if slots.contains_key(&key) {
                index.lines.entry(key).or_default().push(i);
            }
        }

        if index.keys.iter().any(GroupKey::is_null) {
            tracing::warn!("⚠️ Some points in '{}' have a NULL '{}' value", points.name, point_field);
        }

        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[GroupKey] {
        &self.keys
    }

    /// 指定群組的 (點數, 線數)
    pub fn counts(&self, key: &GroupKey) -> Option<(usize, usize)> {
        let slot = self.keys.iter().position(|k| k == key)?;
        let lines = self.lines.get(key).map(Vec::len).unwrap_or(0);
        Some((self.points[slot].len(), lines))
    }

    pub fn into_groups<'a>(self, points: &'a Layer, lines: &'a Layer) -> Groups<'a> {
        Groups {
            index: self,
            points,
            lines,
            position: 0,
        }
    }
}

/// 依群組逐一產生子圖層，子集合在迭代時才複製
pub struct Groups<'a> {
    index: GroupIndex,
    points: &'a Layer,
    lines: &'a Layer,
    position: usize,
}

impl Iterator for Groups<'_> {
    type Item = Group;

    fn next(&mut self) -> Option<Group> {
        let key = self.index.keys.get(self.position)?.clone();
        let point_indices = &self.index.points[self.position];
        let line_indices = self.index.lines.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        self.position += 1;

        Some(Group {
            points: self.points.materialize(format!("{}_{}", self.points.name, key), point_indices),
            lines: self.lines.materialize(format!("{}_{}", self.lines.name, key), line_indices),
            key,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.index.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Groups<'_> {}

pub fn split_by_key<'a>(
    points: &'a Layer,
    lines: &'a Layer,
    point_field: &str,
    line_field: &str,
) -> Result<Groups<'a>> {
    Ok(GroupIndex::build(points, lines, point_field, line_field)?.into_groups(points, lines))
}
