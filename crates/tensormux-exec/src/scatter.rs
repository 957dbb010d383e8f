use tensormux_core::{BatchLimit, IoName, Shape, Tensor, TensorContract};

use crate::error::RunError;
use crate::payload::Payload;

/// Copy each payload's slice of every produced output into its response
/// sink, in the same payload order the inputs were packed in. Outputs a
/// payload did not request are skipped but still advance its read offset.
pub(crate) fn read_outputs(
    contract: &TensorContract,
    outputs: &[(IoName, Tensor)],
    batch_limit: BatchLimit,
    total_batch_size: usize,
    payloads: &mut [Payload],
) -> Result<(), RunError> {
    for entry in &contract.outputs {
        let tensor = outputs
            .iter()
            .find(|(name, _)| name == &entry.name)
            .map(|(_, tensor)| tensor)
            .ok_or_else(|| RunError::MissingOutput {
                name: entry.name.clone(),
            })?;

        let element_count = tensor.shape.numel();
        let reported_byte_size = element_count * tensor.dtype.byte_size();
        let declared_byte_size = element_count * entry.dtype.byte_size();
        let batch1_byte_size = reported_byte_size / total_batch_size;

        // The engine violated the contract, not any one request.
        if declared_byte_size != reported_byte_size
            || tensor.byte_len() != reported_byte_size
        {
            return Err(RunError::OutputSizeMismatch {
                name: entry.name.clone(),
                actual: declared_byte_size,
                total_batch: total_batch_size,
                batch1: batch1_byte_size,
            });
        }

        let instance_shape = if batch_limit.batching() && tensor.shape.rank() > 0 {
            Shape::from_slice(&tensor.shape.0[1..])
        } else {
            tensor.shape.clone()
        };

        let content = &tensor.bytes;
        let mut offset = 0;
        for payload in payloads.iter_mut() {
            let expected = payload.batch_size * batch1_byte_size;
            deliver_slice(
                &entry.name,
                payload,
                &content[offset..offset + expected],
                &instance_shape,
            );
            offset += expected;
        }
    }

    Ok(())
}

/// Hand one payload its slice of one output. Allocation failure lands on
/// the payload alone; the walk continues either way.
fn deliver_slice(name: &IoName, payload: &mut Payload, src: &[u8], shape: &Shape) {
    let Some(sink) = payload.sink.as_mut() else {
        return;
    };
    if !sink.requires_output(name) {
        return;
    }

    let outcome = match sink.allocate(name, src.len(), shape) {
        Ok(dest) => {
            dest.copy_from_slice(src);
            Ok(())
        }
        Err(err) => Err(err),
    };

    if let Err(err) = outcome {
        payload.fail(err.into());
    }
}
