use std::collections::BTreeMap;

use super::{SegmentKind, SpanOverride, TraceTimeline, TraceVariant, apply_map};
use crate::action::{Action, ActionKind, TraceRateSpec};
use crate::error::{Error, Result};
use crate::producer::{SpanSpec, TraceProducer, TraceProducerSpec};
use crate::script::Script;

pub fn trace_id(trace: &TraceTimeline, variant: &TraceVariant) -> String {
    format!("{}-{}", trace.name, variant.name)
}

/// Deep copy of `span` with every override whose key matches a span `ref`.
pub fn apply_overrides(span: &SpanSpec, overrides: &BTreeMap<String, SpanOverride>) -> SpanSpec {
    let mut copy = SpanSpec {
        children: Vec::new(),
        ..span.clone()
    };
    if let Some(o) = overrides.get(&span.reference) {
        if let Some(d) = o.duration {
            copy.duration = d;
        }
        if let Some(e) = o.error {
            copy.error = e;
        }
        if let Some(attrs) = &o.attributes {
            copy.attributes = apply_map(&span.attributes, attrs);
        }
    }
    copy.children = span
        .children
        .iter()
        .map(|c| apply_overrides(c, overrides))
        .collect();
    copy
}

pub(crate) fn merge_trace(script: &mut Script, trace: &TraceTimeline) -> Result<()> {
    if trace.variants.is_empty() {
        return Err(Error::NoTraceVariants(trace.name.clone()));
    }
    for variant in &trace.variants {
        let (Some(first), Some(last)) = (variant.timeline.first(), variant.timeline.last()) else {
            return Err(Error::EmptyTraceTimeline(trace.name.clone()));
        };

        let id = trace_id(trace, variant);
        script.add_trace_producer(
            id.clone(),
            TraceProducer::new(TraceProducerSpec {
                at: first.start_ts,
                to: last.end_ts,
                exemplar: apply_overrides(&trace.exemplar, &variant.overrides),
                disabled: false,
                rate: 0.0,
            }),
        );

        let mut start_at = first.start_ts;
        for seg in &variant.timeline {
            if seg.kind != SegmentKind::Segment {
                continue;
            }
            script.add_action(
                Action::new(
                    &id,
                    start_at,
                    ActionKind::TraceRate(TraceRateSpec {
                        rate: seg.target,
                        start: seg.start,
                    }),
                )
                .with_to(seg.end_ts),
            );
            start_at = seg.end_ts;
        }
    }
    Ok(())
}
