//! 欄位名稱相似度，用來把預設欄位名稱對應到圖層實際的欄位。

use std::collections::HashSet;

fn substrings(text: &str) -> HashSet<String> {
    let chars: Vec<char> = text.trim().to_lowercase().chars().collect();
    let mut set = HashSet::new();
    for start in 0..chars.len() {
        for end in start + 1..=chars.len() {
            set.insert(chars[start..end].iter().collect());
        }
    }
    set
}

/// 兩個字串所有連續子字串集合的 Jaccard 相似度，範圍 0.0 到 1.0。
///
/// 比較前會去除前後空白並轉小寫。兩邊都是空字串時回傳 0.0。
pub fn proximity(first: &str, second: &str) -> f64 {
    let a = substrings(first);
    let b = substrings(second);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// 回傳與 `sample` 最相近的欄位名稱；同分時取較前者。
///
/// 清單為空或沒有任何共同子字串（分數為 0）時回傳 `None`
pub fn find_field<'a, S: AsRef<str>>(sample: &str, fields: &'a [S]) -> Option<&'a str> {
    let mut best: Option<(&'a str, f64)> = None;
    for field in fields {
        let score = proximity(sample, field.as_ref());
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((field.as_ref(), score)),
        }
    }
    best.filter(|(_, score)| *score > 0.0).map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings_score_one() {
        assert_eq!(proximity("canal", "  CANAL "), 1.0);
    }

    #[test]
    fn test_disjoint_strings_score_zero() {
        assert_eq!(proximity("abc", "xyz"), 0.0);
        assert_eq!(proximity("", ""), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        // {a, b, ab} vs {a, c, ac}: 1 shared of 5
        assert!((proximity("ab", "ac") - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_find_field_picks_closest_name() {
        let fields = vec!["id", "canal_name", "type"];
        assert_eq!(find_field("canal", &fields), Some("canal_name"));
        assert_eq!(find_field("TYPE", &fields), Some("type"));
    }

    #[test]
    fn test_find_field_without_overlap_is_none() {
        let fields = vec!["canal", "id"];
        assert_eq!(find_field("type", &fields), None);
        assert_eq!(find_field("", &fields), None);
    }

    #[test]
    fn test_find_field_prefers_first_on_ties() {
        let fields = vec!["xa".to_string(), "ya".to_string()];
        assert_eq!(find_field("a", &fields), Some("xa"));
        let empty: Vec<String> = Vec::new();
        assert_eq!(find_field("a", &empty), None);
    }
}
