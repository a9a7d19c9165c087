use studio_core::error::StudioError;
use studio_flow::{resolve_order, Graph};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

/// Print a checklist for `graph`. Returns the number of failed checks.
pub fn run_validate(graph: &Graph) -> usize {
    let checks = vec![
        check_not_empty(graph),
        check_acyclic(graph),
        check_required_inputs(graph),
        check_isolated(graph),
        check_condition_branches(graph),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
    fail_count
}

fn check_not_empty(graph: &Graph) -> CheckResult {
    CheckResult {
        label: "Nodes".into(),
        ok: !graph.is_empty(),
        detail: format!("{} nodes, {} edges", graph.len(), graph.edges().len()),
    }
}

fn check_acyclic(graph: &Graph) -> CheckResult {
    match resolve_order(graph) {
        Ok(order) => CheckResult {
            label: "Order".into(),
            ok: true,
            detail: format!("{} nodes resolve without cycles", order.len()),
        },
        Err(StudioError::CyclicGraph { nodes }) => CheckResult {
            label: "Order".into(),
            ok: false,
            detail: format!("cycle through {}", nodes.join(", ")),
        },
        Err(e) => CheckResult {
            label: "Order".into(),
            ok: false,
            detail: e.to_string(),
        },
    }
}

fn check_required_inputs(graph: &Graph) -> CheckResult {
    let missing = graph.unsatisfied_inputs();
    if missing.is_empty() {
        CheckResult {
            label: "Inputs".into(),
            ok: true,
            detail: "every required input is connected".into(),
        }
    } else {
        let list: Vec<String> = missing
            .iter()
            .map(|(node, port)| format!("{}.{}", node, port))
            .collect();
        CheckResult {
            label: "Inputs".into(),
            ok: false,
            detail: format!("unconnected: {}", list.join(", ")),
        }
    }
}

// Isolated nodes are legal; this is informational.
fn check_isolated(graph: &Graph) -> CheckResult {
    let isolated: Vec<&str> = graph
        .nodes()
        .iter()
        .filter(|n| graph.incoming(&n.id).next().is_none() && graph.outgoing(&n.id).next().is_none())
        .map(|n| n.id.as_str())
        .collect();
    CheckResult {
        label: "Isolated".into(),
        ok: true,
        detail: if isolated.is_empty() {
            "none".into()
        } else {
            format!("{} (run as starting nodes)", isolated.join(", "))
        },
    }
}

fn check_condition_branches(graph: &Graph) -> CheckResult {
    let dangling: Vec<String> = graph
        .nodes()
        .iter()
        .filter(|n| n.kind == "condition")
        .flat_map(|n| {
            n.output_ports()
                .filter(|p| !graph.outgoing(&n.id).any(|e| e.source_port_id == p.id))
                .map(|p| format!("{}.{}", n.id, p.id))
                .collect::<Vec<_>>()
        })
        .collect();
    CheckResult {
        label: "Branches".into(),
        ok: true,
        detail: if dangling.is_empty() {
            "every condition branch is wired".into()
        } else {
            format!("unwired: {}", dangling.join(", "))
        },
    }
}
