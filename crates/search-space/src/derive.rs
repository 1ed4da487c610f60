use indexmap::IndexMap;

use crate::bounds::RunConfigSearchBounds;
use crate::parameter::{ParameterCategory, ParameterUsage, ParameterValues, SearchParameter};
use crate::profile::{ModelProfileSpec, RuntimeLoadSpec};

fn log2_floor(value: u32) -> i64 {
    (value as f64).log2() as i64
}

fn int_list(name: &str, usage: ParameterUsage, values: &[u32]) -> SearchParameter {
    SearchParameter::new(
        name,
        usage,
        ParameterValues::IntList(values.iter().map(|v| *v as i64).collect()),
    )
}

/// Derives the `{param_name -> SearchParameter}` map for one model,
/// following the fixed precedence: runtime load, batch sizes, max batch
/// size, instance group count, dynamic-batching queue delay.
pub fn derive_search_parameters(
    spec: &ModelProfileSpec,
    bounds: &RunConfigSearchBounds,
) -> IndexMap<String, SearchParameter> {
    let mut params = IndexMap::new();

    if !spec.is_composing_model {
        populate_runtime_load(&mut params, spec, bounds);
    }

    if let Some(batch_sizes) = &spec.parameters.batch_sizes {
        if !batch_sizes.is_empty() {
            params.insert(
                "batch_sizes".to_string(),
                int_list("batch_sizes", ParameterUsage::Runtime, batch_sizes),
            );
        }
    }

    populate_max_batch_size(&mut params, spec, bounds);
    populate_instance_group(&mut params, spec, bounds);
    populate_max_queue_delay(&mut params, spec);

    params
}

fn populate_runtime_load(
    params: &mut IndexMap<String, SearchParameter>,
    spec: &ModelProfileSpec,
    bounds: &RunConfigSearchBounds,
) {
    match &spec.parameters.runtime_load {
        RuntimeLoadSpec::Concurrency(Some(list)) if !list.is_empty() => {
            params.insert(
                "concurrency".to_string(),
                int_list("concurrency", ParameterUsage::Runtime, list),
            );
        }
        RuntimeLoadSpec::Concurrency(_) => {
            params.insert(
                "concurrency".to_string(),
                SearchParameter::exponential_range(
                    "concurrency",
                    ParameterUsage::Runtime,
                    log2_floor(bounds.min_concurrency),
                    log2_floor(bounds.max_concurrency),
                ),
            );
        }
        RuntimeLoadSpec::RequestRate(Some(list)) if !list.is_empty() => {
            params.insert(
                "request_rate".to_string(),
                int_list("request_rate", ParameterUsage::Runtime, list),
            );
        }
        RuntimeLoadSpec::RequestRate(_) => {
            params.insert(
                "request_rate".to_string(),
                SearchParameter::exponential_range(
                    "request_rate",
                    ParameterUsage::Runtime,
                    log2_floor(bounds.min_request_rate),
                    log2_floor(bounds.max_request_rate),
                ),
            );
        }
    }
}

fn populate_max_batch_size(
    params: &mut IndexMap<String, SearchParameter>,
    spec: &ModelProfileSpec,
    bounds: &RunConfigSearchBounds,
) {
    if !spec.supports_batching || spec.is_bls_model {
        return;
    }

    if let Some(list) = spec
        .model_config_parameters
        .as_ref()
        .and_then(|mcp| mcp.max_batch_size.as_ref())
    {
        if !list.is_empty() {
            params.insert(
                "max_batch_size".to_string(),
                int_list("max_batch_size", ParameterUsage::Model, list),
            );
            return;
        }
    }

    params.insert(
        "max_batch_size".to_string(),
        SearchParameter::exponential_range(
            "max_batch_size",
            ParameterUsage::Model,
            log2_floor(bounds.min_model_batch_size),
            log2_floor(bounds.max_model_batch_size),
        ),
    );
}

fn populate_instance_group(
    params: &mut IndexMap<String, SearchParameter>,
    spec: &ModelProfileSpec,
    bounds: &RunConfigSearchBounds,
) {
    if let Some(groups) = spec
        .model_config_parameters
        .as_ref()
        .and_then(|mcp| mcp.instance_group.as_ref())
    {
        if let Some(first) = groups.first() {
            if !first.count.is_empty() {
                params.insert(
                    "instance_group".to_string(),
                    int_list("instance_group", ParameterUsage::Model, &first.count),
                );
                return;
            }
        }
    }

    if !spec.is_ensemble_model {
        params.insert(
            "instance_group".to_string(),
            SearchParameter::new(
                "instance_group",
                ParameterUsage::Model,
                ParameterValues::Range {
                    min: bounds.min_instance_count as i64,
                    max: bounds.max_instance_count as i64,
                },
            ),
        );
    }
}

fn populate_max_queue_delay(params: &mut IndexMap<String, SearchParameter>, spec: &ModelProfileSpec) {
    if let Some(list) = spec
        .model_config_parameters
        .as_ref()
        .and_then(|mcp| mcp.max_queue_delay_microseconds.as_ref())
    {
        if !list.is_empty() {
            params.insert(
                "max_queue_delay_microseconds".to_string(),
                int_list("max_queue_delay_microseconds", ParameterUsage::Model, list),
            );
        }
    }
}

/// Product of every parameter's discrete count: the total size of the
/// search space this model spec derives.
pub fn total_possible_configurations(params: &IndexMap<String, SearchParameter>) -> u64 {
    params
        .values()
        .map(|p| p.discrete_count() as u64)
        .product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{InstanceGroupSpec, InstanceKind, ModelConfigParametersSpec, ParametersSpec};

    fn base_spec() -> ModelProfileSpec {
        ModelProfileSpec::new(
            "resnet50",
            ParametersSpec {
                batch_sizes: None,
                runtime_load: RuntimeLoadSpec::Concurrency(None),
            },
        )
    }

    #[test]
    fn default_spec_derives_concurrency_and_instance_group_and_max_batch_size() {
        let spec = base_spec();
        let bounds = RunConfigSearchBounds::default();
        let params = derive_search_parameters(&spec, &bounds);

        assert!(params.contains_key("concurrency"));
        assert!(params.contains_key("instance_group"));
        assert!(params.contains_key("max_batch_size"));
        assert!(!params.contains_key("request_rate"));
        assert!(!params.contains_key("batch_sizes"));
        assert!(!params.contains_key("max_queue_delay_microseconds"));

        assert_eq!(params["concurrency"].category, ParameterCategory::Exponential);
    }

    #[test]
    fn explicit_concurrency_list_is_used_as_is() {
        let mut spec = base_spec();
        spec.parameters.runtime_load = RuntimeLoadSpec::Concurrency(Some(vec![1, 2, 4]));
        let params = derive_search_parameters(&spec, &RunConfigSearchBounds::default());

        match &params["concurrency"].values {
            ParameterValues::IntList(list) => assert_eq!(list, &vec![1, 2, 4]),
            other => panic!("expected int list, got {other:?}"),
        }
    }

    #[test]
    fn request_rate_mode_excludes_concurrency() {
        let mut spec = base_spec();
        spec.parameters.runtime_load = RuntimeLoadSpec::RequestRate(None);
        let params = derive_search_parameters(&spec, &RunConfigSearchBounds::default());

        assert!(params.contains_key("request_rate"));
        assert!(!params.contains_key("concurrency"));
    }

    #[test]
    fn bls_model_has_no_max_batch_size_parameter() {
        let mut spec = base_spec();
        spec.is_bls_model = true;
        let params = derive_search_parameters(&spec, &RunConfigSearchBounds::default());
        assert!(!params.contains_key("max_batch_size"));
    }

    #[test]
    fn ensemble_model_with_no_explicit_instance_group_has_none() {
        let mut spec = base_spec();
        spec.is_ensemble_model = true;
        let params = derive_search_parameters(&spec, &RunConfigSearchBounds::default());
        assert!(!params.contains_key("instance_group"));
    }

    #[test]
    fn explicit_instance_group_count_overrides_rcs_bounds_even_for_ensembles() {
        let mut spec = base_spec();
        spec.is_ensemble_model = true;
        spec.model_config_parameters = Some(ModelConfigParametersSpec {
            instance_group: Some(vec![InstanceGroupSpec {
                kind: InstanceKind::Gpu,
                count: vec![1, 2, 3, 4],
            }]),
            max_batch_size: None,
            max_queue_delay_microseconds: None,
        });
        let params = derive_search_parameters(&spec, &RunConfigSearchBounds::default());
        match &params["instance_group"].values {
            ParameterValues::IntList(list) => assert_eq!(list.len(), 4),
            other => panic!("expected int list, got {other:?}"),
        }
    }

    #[test]
    fn composing_model_has_no_runtime_load_parameter() {
        let mut spec = base_spec();
        spec.is_composing_model = true;
        let params = derive_search_parameters(&spec, &RunConfigSearchBounds::default());
        assert!(!params.contains_key("concurrency"));
        assert!(!params.contains_key("request_rate"));
    }

    #[test]
    fn total_configurations_is_the_product_of_each_parameter() {
        let mut spec = base_spec();
        spec.parameters.batch_sizes = Some(vec![1, 2, 4, 8]);
        spec.parameters.runtime_load = RuntimeLoadSpec::Concurrency(Some(vec![1, 2]));
        spec.model_config_parameters = Some(ModelConfigParametersSpec {
            instance_group: Some(vec![InstanceGroupSpec {
                kind: InstanceKind::Gpu,
                count: vec![1, 2, 3],
            }]),
            max_batch_size: Some(vec![4, 8]),
            max_queue_delay_microseconds: None,
        });
        let params = derive_search_parameters(&spec, &RunConfigSearchBounds::default());
        // concurrency(2) * batch_sizes(4) * max_batch_size(2) * instance_group(3)
        assert_eq!(total_possible_configurations(&params), 2 * 4 * 2 * 3);
    }
}
