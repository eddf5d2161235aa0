use std::sync::atomic::Ordering;

use kiln_device::HandleExt;

use super::*;
use crate::*;

#[test]
fn test_inapplicable_solvers_are_never_asked() {
    let (ctx, _) = context();
    let registry = SolverRegistry::new()
        .with(FillSolver::new("Skipped").inapplicable())
        .with(FillSolver::new("Chosen"))
        .with(FillSolver::new("Later"));

    let selected = registry.find_solution(&ctx, &Fill { n: 4 }).unwrap();

    assert_eq!(selected.solver, "Chosen");
    assert_eq!(selected.solution.kernels.len(), 1);
}

#[test]
fn test_failing_solver_falls_through() {
    let (ctx, _) = context();
    let registry = SolverRegistry::new().with(FillSolver::new("Broken").failing()).with(FillSolver::new("Fallback"));

    assert_eq!(registry.find_solution(&ctx, &Fill { n: 4 }).unwrap().solver, "Fallback");
}

#[test]
fn test_no_applicable_solver() {
    let (ctx, _) = context();
    let registry = SolverRegistry::new().with(FillSolver::new("Only").inapplicable());

    let err = registry.find_solution(&ctx, &Fill { n: 2 }).unwrap_err();
    assert!(matches!(err, Error::NoSolver { ref config } if config == "fill2"));
}

#[test]
fn test_solution_is_idempotent() {
    let (ctx, _) = context();
    let solver = FillSolver::new("Fill");
    let problem = Fill { n: 8 };

    let first = solver.solution(&ctx, &problem).unwrap();
    let second = solver.solution(&ctx, &problem).unwrap();

    assert_eq!(first.kernels, second.kernels);
    assert_eq!(first.workspace_size, second.workspace_size);
    assert_eq!(solver.solutions.load(Ordering::Relaxed), 2);
}

#[test]
fn test_workspace_sizes_skip_inapplicable() {
    let (ctx, _) = context();
    let registry = SolverRegistry::new()
        .with(FillSolver::new("Off").inapplicable().with_workspace(64))
        .with(FillSolver::new("Scratch").with_workspace(512))
        .with(FillSolver::new("Plain"));

    assert_eq!(registry.workspace_sizes(&ctx, &Fill { n: 1 }), vec![("Scratch", 512), ("Plain", 0)]);
}

#[test]
fn test_search_picks_fastest_solver() {
    let (ctx, _) = context();
    let registry = SolverRegistry::new()
        .with_tunable(TimedSolver { candidates: vec!["5ms"] })
        .with(FillSolver::new("Fill"));
    let out = ctx.handle().write(&[0.0f32; 4]);
    let params = AnyInvokeParams::new(FillParams { out, value: 1.0, workspace: None });

    // the fill kernel reports near-zero time on the CPU handle
    let selected = registry.search_solution(&ctx, &Fill { n: 4 }, &params).unwrap();
    assert_eq!(selected.solver, "Fill");
}

#[test]
fn test_tuned_solver_reports_tunable() {
    let registry = SolverRegistry::<Fill>::new().with_tunable(TimedSolver { candidates: vec!["1ms"] });
    assert!(registry.get("Timed").unwrap().is_tunable());
    assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["Timed"]);
}
