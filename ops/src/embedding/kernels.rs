//! CPU bodies of the embedding backward kernels.
//!
//! All three variants compute the same gradient. They differ in traversal
//! order the way their device counterparts do: per embedding column, per
//! table row, or per input element with atomic adds.

use kiln_device::{ArgsExt, Buffer, KernelArg, KernelInfo, KernelTable, Result};
use kiln_dtype::DType;

use crate::common::float_type;

pub const KERNEL_FILE: &str = "Embedding.cpp";
pub const LOCAL_SIZE: usize = 256;
pub const ALPHA: usize = 64;

pub fn register(table: &KernelTable) {
    table.register(KERNEL_FILE, "EmbeddingBackwardContiguous", backward_contiguous);
    table.register(KERNEL_FILE, "EmbeddingBackwardSmallNumEmbeddingsTraverseContiguous", backward_small_num_embeddings);
    table.register(KERNEL_FILE, "EmbeddingBackwardContiguousAtomic", backward_atomic);
}

/// `(input, output_grad, weight_grad, indices_freq?, error?, embedding_dim,
/// input_size, num_embeddings, padding_idx)`
struct Launch<'a> {
    dtype: DType,
    input: &'a Buffer,
    output_grad: &'a Buffer,
    weight_grad: &'a Buffer,
    indices_freq: Option<&'a Buffer>,
    error: Option<&'a Buffer>,
    embedding_dim: usize,
    input_size: usize,
    num_embeddings: usize,
    padding_idx: i64,
}

impl<'a> Launch<'a> {
    fn parse(info: &KernelInfo, args: &'a [KernelArg]) -> Result<Self> {
        Ok(Self {
            dtype: float_type(info)?,
            input: args.buffer(0)?,
            output_grad: args.buffer(1)?,
            weight_grad: args.buffer(2)?,
            indices_freq: args.opt_buffer(3)?,
            error: args.opt_buffer(4)?,
            embedding_dim: args.usize(5)?,
            input_size: args.usize(6)?,
            num_embeddings: args.usize(7)?,
            padding_idx: args.i64(8)?,
        })
    }

    /// Row and scale of input element `i`; `None` if it contributes nothing.
    fn row(&self, i: usize) -> Result<Option<(usize, f64)>> {
        let index = self.input.load_at(DType::Int64, i)? as i64;
        if index < 0 || index as usize >= self.num_embeddings {
            if let Some(error) = self.error {
                error.store_at(DType::Int32, 0, 1.0)?;
            }
            return Ok(None);
        }
        if index == self.padding_idx {
            return Ok(None);
        }
        let row = index as usize;
        let scale = match self.indices_freq {
            Some(freq) => 1.0 / freq.load_at(DType::Int32, row)?.max(1.0),
            None => 1.0,
        };
        Ok(Some((row, scale)))
    }

    fn accumulate(&self, i: usize, row: usize, scale: f64, column: usize) -> Result<()> {
        let grad = self.output_grad.load_at(self.dtype, i * self.embedding_dim + column)?;
        self.weight_grad.fetch_add(self.dtype, row * self.embedding_dim + column, grad * scale)?;
        Ok(())
    }
}

fn backward_contiguous(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let launch = Launch::parse(info, args)?;
    let rows = (0..launch.input_size).map(|i| launch.row(i)).collect::<Result<Vec<_>>>()?;
    for column in 0..launch.embedding_dim {
        for (i, row) in rows.iter().enumerate() {
            if let Some((row, scale)) = *row {
                launch.accumulate(i, row, scale, column)?;
            }
        }
    }
    Ok(())
}

fn backward_small_num_embeddings(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let launch = Launch::parse(info, args)?;
    let rows = (0..launch.input_size).map(|i| launch.row(i)).collect::<Result<Vec<_>>>()?;
    for target in 0..launch.num_embeddings {
        for (i, row) in rows.iter().enumerate() {
            if let Some((row, scale)) = *row
                && row == target
            {
                for column in 0..launch.embedding_dim {
                    launch.accumulate(i, row, scale, column)?;
                }
            }
        }
    }
    Ok(())
}

fn backward_atomic(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let launch = Launch::parse(info, args)?;
    for i in 0..launch.input_size {
        if let Some((row, scale)) = launch.row(i)? {
            for column in 0..launch.embedding_dim {
                launch.accumulate(i, row, scale, column)?;
            }
        }
    }
    Ok(())
}
