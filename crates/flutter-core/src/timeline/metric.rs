use std::time::Duration;

use xxhash_rust::xxh64::xxh64;

use super::{MetricTimeline, Segment, SegmentKind, Variant, format_base32};
use crate::action::{Action, ActionKind};
use crate::error::{Error, Result};
use crate::generator::{Direction, GeneratorSpec, NormalNoiseSpec, RampSpec};
use crate::producer::{DEFAULT_FREQUENCY, MetricAttributes, MetricSpec};
use crate::script::Script;
use crate::signal::attribute_fingerprint;

/// Spread of the always-on noise generator added to every variant.
const VARIANT_NOISE_VARIATION: f64 = 5.0;

/// Stable ID for one metric variant: base-32 xxHash64 of its identity.
pub fn metric_id(metric: &MetricTimeline, variant: &Variant) -> String {
    let key = format!(
        "{}|{}|{}|{}|",
        metric.name,
        metric.kind.as_str(),
        attribute_fingerprint(&metric.resource_attributes),
        attribute_fingerprint(&variant.attributes),
    );
    format_base32(xxh64(key.as_bytes(), 0))
}

fn noise_id(id: &str) -> String {
    format!("{id}_noise")
}

fn ramp_id(id: &str, k: usize) -> String {
    format!("{id}_ramp_{k}")
}

fn generator_ids(id: &str, timeline: &[Segment]) -> Vec<String> {
    let ramps = timeline.iter().filter(|s| s.kind == SegmentKind::Segment).count();
    std::iter::once(noise_id(id))
        .chain((0..ramps).map(|k| ramp_id(id, k)))
        .collect()
}

pub(crate) fn merge_metric(script: &mut Script, metric: &MetricTimeline) -> Result<()> {
    for variant in &metric.variants {
        let Some(first) = variant.timeline.first() else {
            return Err(Error::EmptyMetricTimeline(metric.name.clone()));
        };

        let id = metric_id(metric, variant);
        let first_at = first.start_ts;
        let last_at = variant
            .timeline
            .iter()
            .filter(|s| s.kind == SegmentKind::Segment)
            .map(|s| s.end_ts)
            .max()
            .unwrap_or(Duration::ZERO);
        if last_at.is_zero() {
            return Err(Error::MissingMetricEnd(metric.name.clone()));
        }

        let spec = MetricSpec {
            name: metric.name.clone(),
            kind: metric.kind,
            attributes: MetricAttributes {
                resource: metric.resource_attributes.clone(),
                scope: Default::default(),
                datapoint: variant.attributes.clone(),
            },
            generators: generator_ids(&id, &variant.timeline),
            frequency: if metric.frequency.is_zero() {
                DEFAULT_FREQUENCY
            } else {
                metric.frequency
            },
            to: last_at,
            disabled: false,
        };
        script.add_action(Action::new(&id, first_at, ActionKind::Metric(spec)).with_to(last_at));

        script.add_action(Action::new(
            noise_id(&id),
            Duration::ZERO,
            ActionKind::MetricGenerator(GeneratorSpec::NormalNoise(NormalNoiseSpec {
                target: 0.0,
                std_dev: -1.0,
                variation: VARIANT_NOISE_VARIATION,
                direction: Direction::Both,
            })
            .into()),
        ));

        script.add_actions(segment_actions(&id, &variant.timeline));
    }
    Ok(())
}

/// One ramp per segment, chained so each starts where the previous ended.
/// Only the ramp that owns the current interval contributes a value.
fn segment_actions(id: &str, timeline: &[Segment]) -> Vec<Action> {
    let ramps = timeline.iter().filter(|s| s.kind == SegmentKind::Segment).count();
    let mut actions = Vec::new();
    let mut start_at = timeline.first().map(|s| s.start_ts).unwrap_or_default();
    let mut start_value = timeline.first().and_then(|s| s.start).unwrap_or(0.0);
    let mut disabled = false;
    let mut k = 0;

    for seg in timeline {
        if !seg.start_ts.is_zero() {
            start_at = seg.start_ts;
        }
        if let Some(start) = seg.start {
            start_value = start;
        }

        if seg.kind == SegmentKind::Disable {
            actions.push(Action::new(id, seg.start_ts, ActionKind::DisableMetric));
            disabled = true;
            continue;
        }

        if disabled {
            actions.push(Action::new(id, start_at, ActionKind::EnableMetric));
            disabled = false;
        }

        let duration = seg.end_ts.saturating_sub(start_at);
        actions.push(Action::new(
            ramp_id(id, k),
            start_at,
            ActionKind::MetricGenerator(GeneratorSpec::Ramp(RampSpec {
                start: start_value,
                target: seg.target,
                duration: if duration.is_zero() {
                    Duration::from_secs(1)
                } else {
                    duration
                },
                prestart_zero: k > 0,
                postend_zero: k + 1 < ramps,
            })
            .into()),
        ));

        k += 1;
        start_value = seg.target;
        start_at = seg.end_ts;
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MetricKind;
    use serde_json::json;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn seg(start_ts: u64, end_ts: u64, start: Option<f64>, target: f64) -> Segment {
        Segment {
            kind: SegmentKind::Segment,
            start_ts: secs(start_ts),
            end_ts: secs(end_ts),
            start,
            target,
        }
    }

    fn metric(timeline: Vec<Segment>) -> MetricTimeline {
        MetricTimeline {
            name: "http.requests".to_string(),
            kind: MetricKind::Sum,
            frequency: Duration::ZERO,
            resource_attributes: [("service.name".to_string(), json!("cart"))].into(),
            variants: vec![Variant {
                attributes: [("status".to_string(), json!(200))].into(),
                timeline,
            }],
        }
    }

    fn ramps(actions: &[Action]) -> Vec<(String, Duration, RampSpec)> {
        actions
            .iter()
            .filter_map(|a| match &a.kind {
                ActionKind::MetricGenerator(p) => match p.resolve() {
                    Ok(GeneratorSpec::Ramp(r)) => Some((a.id.clone(), a.at, r)),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_metric_id_is_stable_and_attribute_sensitive() {
        let m = metric(vec![seg(0, 60, None, 1.0)]);
        let a = metric_id(&m, &m.variants[0]);
        assert_eq!(a, metric_id(&m, &m.variants[0]));
        assert!(a.chars().all(|c| c.is_ascii_digit() || ('a'..='v').contains(&c)));

        let mut other = m.clone();
        other.variants[0].attributes.insert("status".to_string(), json!(500));
        assert_ne!(a, metric_id(&other, &other.variants[0]));
    }

    #[test]
    fn test_generator_ids() {
        let timeline = vec![
            seg(0, 60, None, 1.0),
            Segment {
                kind: SegmentKind::Disable,
                start_ts: secs(60),
                ..Default::default()
            },
            seg(90, 120, None, 2.0),
        ];
        assert_eq!(generator_ids("x", &timeline), vec!["x_noise", "x_ramp_0", "x_ramp_1"]);
    }

    #[test]
    fn test_ramps_chain_targets() {
        let timeline = vec![seg(0, 300, Some(10.0), 100.0), seg(0, 600, None, 50.0), seg(0, 900, None, 75.0)];
        let actions = segment_actions("m", &timeline);
        let r = ramps(&actions);
        assert_eq!(r.len(), 3);

        assert_eq!((r[0].1, r[0].2.start, r[0].2.target), (secs(0), 10.0, 100.0));
        assert_eq!((r[1].1, r[1].2.start, r[1].2.target), (secs(300), 100.0, 50.0));
        assert_eq!((r[2].1, r[2].2.start, r[2].2.target), (secs(600), 50.0, 75.0));
        assert_eq!(r[1].2.duration, secs(300));

        assert!(r[0].2.postend_zero && r[1].2.postend_zero && !r[2].2.postend_zero);
        assert!(!r[0].2.prestart_zero && r[1].2.prestart_zero && r[2].2.prestart_zero);
    }

    #[test]
    fn test_disable_brackets_enable() {
        let timeline = vec![
            seg(0, 60, None, 1.0),
            Segment {
                kind: SegmentKind::Disable,
                start_ts: secs(60),
                ..Default::default()
            },
            seg(120, 180, None, 2.0),
        ];
        let actions = segment_actions("m", &timeline);
        let kinds: Vec<_> = actions.iter().map(|a| (a.type_name(), a.at)).collect();
        assert_eq!(
            kinds,
            vec![
                ("metricGenerator", secs(0)),
                ("disableMetric", secs(60)),
                ("enableMetric", secs(120)),
                ("metricGenerator", secs(120)),
            ]
        );
    }

    #[test]
    fn test_zero_length_segment_gets_one_second() {
        let actions = segment_actions("m", &[seg(30, 30, None, 5.0)]);
        assert_eq!(ramps(&actions)[0].2.duration, secs(1));
    }

    #[test]
    fn test_merge_builds_producer_and_noise() {
        let m = metric(vec![seg(60, 300, Some(0.0), 10.0), seg(0, 600, None, 20.0)]);
        let mut script = Script::new();
        merge_metric(&mut script, &m).unwrap();

        let id = metric_id(&m, &m.variants[0]);
        let producer = script.actions().iter().find(|a| a.type_name() == "metric").unwrap();
        assert_eq!(producer.id, id);
        assert_eq!(producer.at, secs(60));
        assert_eq!(producer.to, secs(600));
        let ActionKind::Metric(spec) = &producer.kind else {
            unreachable!()
        };
        assert_eq!(spec.to, secs(600));
        assert_eq!(spec.frequency, DEFAULT_FREQUENCY);
        assert_eq!(spec.generators[0], format!("{id}_noise"));
        assert_eq!(spec.attributes.datapoint.get("status"), Some(&json!(200)));

        let noise = script
            .actions()
            .iter()
            .find(|a| a.id == format!("{id}_noise"))
            .unwrap();
        assert_eq!(noise.at, Duration::ZERO);
    }

    #[test]
    fn test_merge_errors() {
        let mut script = Script::new();
        assert!(matches!(
            merge_metric(&mut script, &metric(vec![])),
            Err(Error::EmptyMetricTimeline(_))
        ));

        let only_disable = vec![Segment {
            kind: SegmentKind::Disable,
            ..Default::default()
        }];
        assert!(matches!(
            merge_metric(&mut script, &metric(only_disable)),
            Err(Error::MissingMetricEnd(_))
        ));
    }
}
