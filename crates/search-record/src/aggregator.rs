use std::collections::HashMap;

use crate::Record;

/// A GPU-device-scoped record as returned by the telemetry monitor: a
/// metric value tagged with the device UUID it was collected from.
#[derive(Debug, Clone)]
pub struct RawGpuRecord {
    pub device_uuid: String,
    pub record: Record,
}

/// Output of [`Aggregator::aggregate`]: one record per tag for the non-GPU
/// metrics, and one record per (device, tag) for the GPU metrics.
#[derive(Debug, Clone, Default)]
pub struct AggregatedMeasurement {
    pub non_gpu: Vec<Record>,
    pub gpu: HashMap<String, Vec<Record>>,
}

/// Per-tag reduction applied when the harness or monitor reports more than
/// one sample for the same metric in a single measurement window.
#[derive(Debug, Clone, Copy)]
enum ReductionPolicy {
    /// A single report is expected; if several arrive, keep the last.
    AsIs,
    Average,
    Sum,
}

fn reduction_policy_for(tag: &str) -> ReductionPolicy {
    match tag {
        "gpu_utilization" => ReductionPolicy::Average,
        "gpu_used_memory" | "cpu_used_ram" => ReductionPolicy::Sum,
        _ => ReductionPolicy::AsIs,
    }
}

fn reduce(tag: &str, records: Vec<Record>) -> Record {
    debug_assert!(!records.is_empty());
    match reduction_policy_for(tag) {
        ReductionPolicy::AsIs => records.into_iter().last().unwrap(),
        ReductionPolicy::Average => {
            let polarity = records[0].polarity;
            let n = records.len() as f64;
            let total: f64 = records.iter().map(Record::value).sum();
            Record::with_polarity(tag, total / n, polarity)
        }
        ReductionPolicy::Sum => {
            let polarity = records[0].polarity;
            let total: f64 = records.iter().map(Record::value).sum();
            Record::with_polarity(tag, total, polarity)
        }
    }
}

fn bucket_by_tag(records: Vec<Record>) -> HashMap<String, Vec<Record>> {
    let mut buckets: HashMap<String, Vec<Record>> = HashMap::new();
    for record in records {
        buckets.entry(record.tag.clone()).or_default().push(record);
    }
    buckets
}

/// Buckets raw harness/telemetry records by metric type (and, for GPU
/// records, by device) and reduces each bucket to a single record per
/// the aggregator's component design (§4.D): averaging GPU utilization,
/// summing used memory, and post-processing `gpu_free_memory` against its
/// matched `gpu_used_memory` reading on the same device.
pub struct Aggregator;

impl Aggregator {
    pub fn aggregate(
        non_gpu_records: Vec<Record>,
        gpu_records: Vec<RawGpuRecord>,
    ) -> AggregatedMeasurement {
        let non_gpu = bucket_by_tag(non_gpu_records)
            .into_iter()
            .map(|(tag, records)| reduce(&tag, records))
            .collect();

        let mut per_device: HashMap<String, Vec<Record>> = HashMap::new();
        for raw in gpu_records {
            per_device.entry(raw.device_uuid).or_default().push(raw.record);
        }

        let mut gpu = HashMap::new();
        for (device_uuid, records) in per_device {
            let reduced: Vec<Record> = bucket_by_tag(records)
                .into_iter()
                .map(|(tag, records)| reduce(&tag, records))
                .collect();
            gpu.insert(device_uuid, Self::resolve_free_memory(reduced));
        }

        AggregatedMeasurement { non_gpu, gpu }
    }

    /// Subtract the matched `gpu_used_memory` reading from `gpu_free_memory`
    /// on the same device. A `gpu_free_memory` record with no matching
    /// `gpu_used_memory` record is dropped, per the aggregator's spec.
    fn resolve_free_memory(mut records: Vec<Record>) -> Vec<Record> {
        let used_value = records
            .iter()
            .find(|r| r.tag == "gpu_used_memory")
            .map(Record::value);

        match used_value {
            Some(used) => {
                for record in records.iter_mut() {
                    if record.tag == "gpu_free_memory" {
                        record.value -= used;
                    }
                }
            }
            None => {
                records.retain(|r| r.tag != "gpu_free_memory");
            }
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Polarity;

    fn r(tag: &str, value: f64) -> Record {
        Record::new(tag, value)
    }

    #[test]
    fn non_gpu_records_pass_through_one_per_tag() {
        let out = Aggregator::aggregate(vec![r("perf_throughput", 500.0)], vec![]);
        assert_eq!(out.non_gpu.len(), 1);
        assert_eq!(out.non_gpu[0].value, 500.0);
    }

    #[test]
    fn gpu_utilization_is_averaged_per_device() {
        let gpu = vec![
            RawGpuRecord {
                device_uuid: "gpu-0".into(),
                record: r("gpu_utilization", 40.0),
            },
            RawGpuRecord {
                device_uuid: "gpu-0".into(),
                record: r("gpu_utilization", 60.0),
            },
        ];
        let out = Aggregator::aggregate(vec![], gpu);
        let records = &out.gpu["gpu-0"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 50.0);
    }

    #[test]
    fn free_memory_is_adjusted_by_matched_used_memory() {
        let gpu = vec![
            RawGpuRecord {
                device_uuid: "gpu-0".into(),
                record: r("gpu_used_memory", 2000.0),
            },
            RawGpuRecord {
                device_uuid: "gpu-0".into(),
                record: r("gpu_free_memory", 8000.0),
            },
        ];
        let out = Aggregator::aggregate(vec![], gpu);
        let records = &out.gpu["gpu-0"];
        let free = records.iter().find(|r| r.tag == "gpu_free_memory").unwrap();
        assert_eq!(free.value, 6000.0);
    }

    #[test]
    fn unmatched_free_memory_is_dropped() {
        let gpu = vec![RawGpuRecord {
            device_uuid: "gpu-0".into(),
            record: r("gpu_free_memory", 8000.0),
        }];
        let out = Aggregator::aggregate(vec![], gpu);
        let records = &out.gpu["gpu-0"];
        assert!(records.iter().all(|r| r.tag != "gpu_free_memory"));
    }

    #[test]
    fn used_memory_sums_across_reports() {
        let gpu = vec![
            RawGpuRecord {
                device_uuid: "gpu-0".into(),
                record: Record::with_polarity("gpu_used_memory", 100.0, Polarity::LowerBetter),
            },
            RawGpuRecord {
                device_uuid: "gpu-0".into(),
                record: Record::with_polarity("gpu_used_memory", 50.0, Polarity::LowerBetter),
            },
        ];
        let out = Aggregator::aggregate(vec![], gpu);
        let used = out.gpu["gpu-0"]
            .iter()
            .find(|r| r.tag == "gpu_used_memory")
            .unwrap();
        assert_eq!(used.value, 150.0);
    }
}
