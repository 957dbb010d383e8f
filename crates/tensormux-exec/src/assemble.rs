use tensormux_core::{BatchLimit, DType, HostAllocator, IoName, Shape, Tensor};

use crate::payload::{Payload, PayloadError};

/// One input tensor to build for the combined batch. Declared inputs pull
/// their bytes through each payload's content source; override inputs copy
/// the payload's override value, or leave zeros when a payload carries none.
pub(crate) struct InputPlan {
    pub name: IoName,
    pub dtype: DType,
    /// Per-instance dims; the batch dimension is added here when the model
    /// batches.
    pub dims: Shape,
    pub kind: InputKind,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputKind {
    Declared,
    Override,
}

/// Pack one input across the whole batch into a single contiguous tensor.
/// Payload faults are recorded on the payload and never abort the batch;
/// a failed payload's slice stays zero-filled and offsets stay aligned.
pub(crate) fn pack_input(
    allocator: &HostAllocator,
    plan: &InputPlan,
    batch_limit: BatchLimit,
    total_batch_size: usize,
    payloads: &mut [Payload],
) -> Tensor {
    let batch1_byte_size = plan.dims.numel() * plan.dtype.byte_size();
    let total_byte_size = total_batch_size * batch1_byte_size;

    let shape = if batch_limit.batching() {
        plan.dims.with_leading(total_batch_size)
    } else {
        plan.dims.clone()
    };

    let mut buffer = allocator.alloc_zeroed(total_byte_size);

    let mut offset = 0;
    for payload in payloads.iter_mut() {
        let expected = payload.batch_size * batch1_byte_size;
        if payload.is_ok() {
            let dest = &mut buffer[offset..offset + expected];
            match plan.kind {
                InputKind::Declared => copy_from_source(&plan.name, payload, dest),
                InputKind::Override => copy_from_override(&plan.name, payload, dest),
            }
        }
        offset += expected;
    }

    Tensor::new(plan.dtype, shape, buffer.freeze())
}

/// Pull `dest.len()` bytes for `name` from the payload's content source,
/// consuming chunks until the slice is full or the source runs dry.
fn copy_from_source(name: &IoName, payload: &mut Payload, dest: &mut [u8]) {
    let expected = dest.len();
    let mut copied = 0;

    while copied < expected {
        let chunk = match payload.source.next_chunk(name, expected - copied) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                payload.fail(err.into());
                return;
            }
        };

        if copied + chunk.len() > expected {
            let got = copied + chunk.len();
            payload.fail(PayloadError::InputTooLarge {
                name: name.clone(),
                got,
                expected,
            });
            return;
        }

        dest[copied..copied + chunk.len()].copy_from_slice(chunk);
        copied += chunk.len();
    }

    if copied != expected {
        payload.fail(PayloadError::InputTooShort {
            name: name.clone(),
            got: copied,
            expected,
        });
    }
}

/// Copy the payload's override value for `name`. A payload without this
/// override keeps its zero-filled slice.
fn copy_from_override(name: &IoName, payload: &mut Payload, dest: &mut [u8]) {
    let expected = dest.len();
    let value = match payload.override_for(name) {
        Some(overridden) => overridden.value.clone(),
        None => return,
    };

    if value.len() > expected {
        payload.fail(PayloadError::InputTooLarge {
            name: name.clone(),
            got: value.len(),
            expected,
        });
        return;
    }
    if value.len() < expected {
        payload.fail(PayloadError::InputTooShort {
            name: name.clone(),
            got: value.len(),
            expected,
        });
        return;
    }

    dest.copy_from_slice(&value);
}
