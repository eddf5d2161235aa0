use kiln_device::{Buffer, HandleExt};
use kiln_dtype::DType;
use kiln_solver::{Dispatcher, Policy, TensorDesc};
use test_case::test_case;

use super::*;
use crate::embedding::{self, EmbeddingBackwardParams, EmbeddingBackwardProblem};
use crate::Operators;

const OUTPUT_GRAD: [f64; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

fn problem(indices: usize, num_embeddings: usize, deterministic: bool) -> EmbeddingBackwardProblem {
    EmbeddingBackwardProblem::new(
        TensorDesc::new(DType::Int64, &[indices]),
        TensorDesc::new(DType::Float32, &[indices, 2]),
        TensorDesc::new(DType::Float32, &[num_embeddings, 2]),
        deterministic,
    )
}

struct Run {
    weight_grad: Vec<f64>,
    error: Buffer,
}

fn run(
    indices: &[f64],
    num_embeddings: usize,
    deterministic: bool,
    padding_idx: Option<i64>,
    indices_freq: Option<&[i32]>,
) -> Run {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let problem = problem(indices.len(), num_embeddings, deterministic);
    // Stale contents must not leak into the gradient.
    let weight_grad = tensor(ctx, problem.weight_grad().clone(), &vec![7.0; num_embeddings * 2]);
    let error = ctx.handle().write(&[0i32]);

    let params = EmbeddingBackwardParams {
        input: tensor(ctx, problem.input().clone(), indices),
        output_grad: tensor(ctx, problem.output_grad().clone(), &OUTPUT_GRAD),
        weight_grad: weight_grad.clone(),
        padding_idx,
        indices_freq: indices_freq.map(|freq| ctx.handle().write(freq)),
        error: Some(error.clone()),
    };
    assert_eq!(ops.embedding_backward(&problem, params).unwrap(), "EmbeddingBackward");
    Run { weight_grad: download(&weight_grad), error }
}

fn row(grad: &[f64], index: usize) -> &[f64] {
    &grad[index * 2..index * 2 + 2]
}

#[test_case(40, false ; "atomic")]
#[test_case(4, false ; "small table")]
#[test_case(40, true ; "deterministic")]
fn test_rows_accumulate(num_embeddings: usize, deterministic: bool) {
    let result = run(&[3.0, 1.0, 3.0], num_embeddings, deterministic, None, None);

    assert_eq!(row(&result.weight_grad, 3), [6.0, 8.0]);
    assert_eq!(row(&result.weight_grad, 1), [3.0, 4.0]);
    assert_eq!(row(&result.weight_grad, 0), [0.0, 0.0]);
    assert_eq!(result.weight_grad.iter().sum::<f64>(), 21.0);
}

#[test]
fn test_padding_row_gets_no_gradient() {
    let result = run(&[3.0, 1.0, 3.0], 4, false, Some(3), None);
    assert_eq!(row(&result.weight_grad, 3), [0.0, 0.0]);
    assert_eq!(row(&result.weight_grad, 1), [3.0, 4.0]);
}

#[test]
fn test_out_of_range_index_raises_error() {
    let result = run(&[3.0, 7.0, 0.0], 4, false, None, None);

    assert_eq!(result.error.load_at(DType::Int32, 0).unwrap(), 1.0);
    assert_eq!(row(&result.weight_grad, 3), [1.0, 2.0]);
    assert_eq!(row(&result.weight_grad, 0), [5.0, 6.0]);
}

#[test]
fn test_frequency_scaling() {
    let result = run(&[3.0, 1.0, 3.0], 4, false, None, Some(&[0, 1, 0, 2]));
    assert_eq!(row(&result.weight_grad, 3), [3.0, 4.0]);
    assert_eq!(row(&result.weight_grad, 1), [3.0, 4.0]);
    assert_eq!(result.error.load_at(DType::Int32, 0).unwrap(), 0.0);
}

#[test_case(40, false, false, "EmbeddingBackwardContiguousAtomic")]
#[test_case(32, false, false, "EmbeddingBackwardSmallNumEmbeddingsTraverseContiguous")]
#[test_case(40, true, false, "EmbeddingBackwardContiguous")]
#[test_case(40, false, true, "EmbeddingBackwardContiguous" ; "deterministic policy")]
fn test_kernel_choice(num_embeddings: usize, deterministic: bool, policy: bool, kernel: &str) {
    let ctx = context().with_policy(Policy::builder().deterministic(policy).build());
    let (_, plan) = Dispatcher::new(embedding::solvers()).plan(&ctx, &problem(3, num_embeddings, deterministic)).unwrap();
    assert_eq!(plan.kernels()[0].name(), kernel);
}

#[test]
fn test_mismatched_embedding_dim_is_rejected() {
    let ctx = context();
    let problem = EmbeddingBackwardProblem::new(
        TensorDesc::new(DType::Int64, &[3]),
        TensorDesc::new(DType::Float32, &[3, 2]),
        TensorDesc::new(DType::Float32, &[4, 3]),
        false,
    );
    assert!(Dispatcher::new(embedding::solvers()).plan(&ctx, &problem).is_err());
}

#[test]
fn test_shared_dispatcher_follows_policy_change() {
    let ctx = context();
    let deterministic = ctx.with_policy(Policy::builder().deterministic(true).build());
    let dispatcher = Dispatcher::new(embedding::solvers());
    let problem = problem(3, 40, false);

    let (_, atomic) = dispatcher.plan(&ctx, &problem).unwrap();
    let (_, ordered) = dispatcher.plan(&deterministic, &problem).unwrap();

    assert_eq!(atomic.kernels()[0].name(), "EmbeddingBackwardContiguousAtomic");
    assert_eq!(ordered.kernels()[0].name(), "EmbeddingBackwardContiguous");
}
