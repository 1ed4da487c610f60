use serde::{Deserialize, Serialize};

/// Which layer of the system a parameter's value is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterUsage {
    Model,
    Runtime,
    Build,
}

/// How a parameter's values are represented and walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterCategory {
    Integer,
    Exponential,
    IntList,
    StrList,
}

/// The concrete values a [`SearchParameter`] can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValues {
    /// Inclusive `[min, max]` index range. For [`ParameterCategory::Exponential`]
    /// the realized value at index `i` is `2^i`; for [`ParameterCategory::Integer`]
    /// it is `i` itself.
    Range { min: i64, max: i64 },
    IntList(Vec<i64>),
    StrList(Vec<String>),
}

/// One dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParameter {
    pub name: String,
    pub usage: ParameterUsage,
    pub category: ParameterCategory,
    pub values: ParameterValues,
}

impl SearchParameter {
    pub fn new(name: impl Into<String>, usage: ParameterUsage, values: ParameterValues) -> Self {
        let category = match &values {
            ParameterValues::Range { .. } => ParameterCategory::Integer,
            ParameterValues::IntList(_) => ParameterCategory::IntList,
            ParameterValues::StrList(_) => ParameterCategory::StrList,
        };
        SearchParameter {
            name: name.into(),
            usage,
            category,
            values,
        }
    }

    pub fn exponential_range(name: impl Into<String>, usage: ParameterUsage, min: i64, max: i64) -> Self {
        SearchParameter {
            name: name.into(),
            usage,
            category: ParameterCategory::Exponential,
            values: ParameterValues::Range { min, max },
        }
    }

    /// Number of discrete values this parameter contributes to the total
    /// search-space size.
    pub fn discrete_count(&self) -> usize {
        match &self.values {
            ParameterValues::Range { min, max } => (max - min + 1).max(0) as usize,
            ParameterValues::IntList(list) => list.len(),
            ParameterValues::StrList(list) => list.len(),
        }
    }

    /// The realized value at range index `idx`, honoring the exponential
    /// category's `2^idx` mapping. Panics if called on a list category.
    pub fn realized_value_at(&self, idx: i64) -> i64 {
        match self.category {
            ParameterCategory::Exponential => 1i64 << idx,
            ParameterCategory::Integer => idx,
            _ => panic!("realized_value_at is only defined for range categories"),
        }
    }

    /// Every value this parameter can take, realized and in walk order.
    /// Empty for a `StrList` parameter (callers that need string values
    /// walk `values` directly).
    pub fn realize_all(&self) -> Vec<i64> {
        match &self.values {
            ParameterValues::Range { min, max } => (*min..=*max).map(|idx| self.realized_value_at(idx)).collect(),
            ParameterValues::IntList(list) => list.clone(),
            ParameterValues::StrList(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_range_realizes_powers_of_two() {
        let param = SearchParameter::exponential_range("concurrency", ParameterUsage::Runtime, 0, 3);
        assert_eq!(param.realized_value_at(0), 1);
        assert_eq!(param.realized_value_at(3), 8);
    }

    #[test]
    fn discrete_count_matches_category() {
        let range = SearchParameter::exponential_range("concurrency", ParameterUsage::Runtime, 0, 3);
        assert_eq!(range.discrete_count(), 4);

        let list = SearchParameter::new(
            "batch_sizes",
            ParameterUsage::Runtime,
            ParameterValues::IntList(vec![1, 2, 4, 8]),
        );
        assert_eq!(list.discrete_count(), 4);
    }

    #[test]
    fn realize_all_matches_discrete_count() {
        let range = SearchParameter::exponential_range("concurrency", ParameterUsage::Runtime, 0, 3);
        assert_eq!(range.realize_all(), vec![1, 2, 4, 8]);

        let list = SearchParameter::new("batch_sizes", ParameterUsage::Runtime, ParameterValues::IntList(vec![1, 4]));
        assert_eq!(list.realize_all(), vec![1, 4]);
    }
}
