//! Standard property checks run against a resolved runtime tree
//! (`spec.md` §4.6 "Standard property checks"), independent of which
//! binding dialect supplied the node's `NodeType`.

use std::collections::HashMap;

use crate::diagnostics::{DiagnosticKind, DtsDiagnostic};
use crate::runtime::{ast_range, FileAst, NodeRef, PropertyObject, QuickValue, RuntimeTree};

const DEFAULT_ADDRESS_CELLS: u32 = 2;
const DEFAULT_SIZE_CELLS: u32 = 1;

/// The `status` enum, in canonical order. Shared with the completion query
/// so `status = |` offers the same values this check accepts.
pub const STATUS_VALUES: [&str; 5] = ["okay", "disabled", "reserved", "fail", "fail-sss"];

/// Runs every standard check over `tree`, returning one diagnostic per
/// violation. Node-local checks (`status`, `compatible`, `reg`, ...) run
/// once per node; `interrupt-map` and friends additionally need the
/// referenced target's cell-specifier width, which is why `tree` is passed
/// instead of one node at a time. `files` resolves a property's
/// declaration site back to a concrete range.
pub fn run_standard_checks(tree: &RuntimeTree, files: &[FileAst]) -> Vec<DtsDiagnostic> {
    let mut out = Vec::new();
    for node_ref in 0..tree.nodes.len() {
        check_node(tree, node_ref, files, &mut out);
    }
    out
}

fn check_node(tree: &RuntimeTree, node_ref: NodeRef, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let node = tree.get(node_ref);
    if node.deleted {
        return;
    }

    check_status(node, files, out);
    check_compatible(node, files, out);
    check_model(node, files, out);
    check_device_type(node, files, out);
    check_cells_properties(node, files, out);
    check_reg(tree, node_ref, files, out);
    check_ranges(tree, node_ref, "ranges", files, out);
    check_ranges(tree, node_ref, "dma-ranges", files, out);
    check_interrupts(tree, node_ref, files, out);
    check_nexus_map(tree, node_ref, "interrupt-map", "interrupt-map-mask", files, out);
    check_nexus_map(tree, node_ref, "gpio-map", "gpio-map-mask", files, out);
    check_names_companion(node, "reg-names", "reg", files, out);
    check_names_companion(node, "interrupt-names", "interrupts", files, out);
    check_names_companion(node, "clock-names", "clocks", files, out);
    check_phandle_arrays(tree, node_ref, files, out);
}

/// Builds a diagnostic anchored at `prop`'s declaration site, tagging which
/// open document it belongs to so multi-file contexts publish it correctly.
fn diag(kind: DiagnosticKind, files: &[FileAst], prop: &PropertyObject) -> DtsDiagnostic {
    DtsDiagnostic::new(kind, ast_range(files, prop)).with_file(prop.declaration_site.file.clone())
}

fn numbers_of(prop: &PropertyObject) -> Vec<i64> {
    prop.quick_values
        .iter()
        .filter_map(|v| match v {
            QuickValue::Number(n) => Some(*n),
            _ => None,
        })
        .collect()
}

fn strings_of(prop: &PropertyObject) -> Vec<String> {
    prop.quick_values
        .iter()
        .filter_map(|v| match v {
            QuickValue::Str(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

fn check_status(node: &crate::runtime::RuntimeNode, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let Some(prop) = node.properties.get("status") else {
        return;
    };
    let strings = strings_of(prop);
    if let Some(value) = strings.first() {
        if !STATUS_VALUES.contains(&value.as_str()) {
            out.push(
                diag(DiagnosticKind::EnumValueMismatch, files, prop)
                    .with_args(["status", value, &STATUS_VALUES.join(", ")]),
            );
        }
    }
}

fn check_compatible(node: &crate::runtime::RuntimeNode, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let Some(prop) = node.properties.get("compatible") else {
        return;
    };
    if strings_of(prop).is_empty() {
        out.push(
            diag(DiagnosticKind::TypeMismatch, files, prop)
                .with_args(["compatible", "string-list", "non-string value"]),
        );
    }
}

fn check_model(node: &crate::runtime::RuntimeNode, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let Some(prop) = node.properties.get("model") else {
        return;
    };
    let strings = strings_of(prop);
    if strings.len() != 1 {
        out.push(
            diag(DiagnosticKind::TypeMismatch, files, prop)
                .with_args(["model", "string", "string-list"]),
        );
    }
}

fn check_device_type(node: &crate::runtime::RuntimeNode, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let Some(prop) = node.properties.get("device_type") else {
        return;
    };
    out.push(
        diag(DiagnosticKind::Deprecated, files, prop)
            .with_args(["device_type"]),
    );
    let strings = strings_of(prop);
    if node.name() == "cpu" && strings.first().map(String::as_str) != Some("cpu") {
        out.push(
            diag(DiagnosticKind::ConstValueMismatch, files, prop)
                .with_args(["device_type", "cpu"]),
        );
    }
    if node.name() == "memory" && strings.first().map(String::as_str) != Some("memory") {
        out.push(
            diag(DiagnosticKind::ConstValueMismatch, files, prop)
                .with_args(["device_type", "memory"]),
        );
    }
}

fn check_cells_properties(node: &crate::runtime::RuntimeNode, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    for name in ["#address-cells", "#size-cells", "#interrupt-cells"] {
        let Some(prop) = node.properties.get(name) else {
            continue;
        };
        let numbers = numbers_of(prop);
        if numbers.len() != 1 {
            out.push(
                diag(DiagnosticKind::CellMissMatch, files, prop)
                    .with_args([name, "1", &numbers.len().to_string()]),
            );
        }
    }
}

fn address_cells(tree: &RuntimeTree, parent: NodeRef) -> u32 {
    tree.get(parent)
        .properties
        .get("#address-cells")
        .and_then(|p| numbers_of(p).first().copied())
        .map(|n| n as u32)
        .unwrap_or(DEFAULT_ADDRESS_CELLS)
}

fn size_cells(tree: &RuntimeTree, parent: NodeRef) -> u32 {
    tree.get(parent)
        .properties
        .get("#size-cells")
        .and_then(|p| numbers_of(p).first().copied())
        .map(|n| n as u32)
        .unwrap_or(DEFAULT_SIZE_CELLS)
}

fn check_reg(tree: &RuntimeTree, node_ref: NodeRef, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let node = tree.get(node_ref);
    let Some(parent) = node.parent else {
        return;
    };
    let Some(prop) = node.properties.get("reg") else {
        return;
    };

    let a = address_cells(tree, parent) as usize;
    let s = size_cells(tree, parent) as usize;
    let group = a + s;
    if group == 0 {
        return;
    }
    let numbers = numbers_of(prop);
    if numbers.len() % group != 0 {
        out.push(
            diag(DiagnosticKind::RegMismatch, files, prop)
                .with_args([format!("entry length must be a multiple of {group} cells")]),
        );
        return;
    }

    if let Some(address) = node.address.as_deref() {
        if let Ok(declared) = parse_address_literal(address) {
            let first_address = cells_to_u64(&numbers[0..a]);
            if first_address != declared {
                out.push(
                    diag(DiagnosticKind::RegMismatch, files, prop)
                        .with_args([format!(
                            "first reg address 0x{first_address:x} does not match unit address 0x{declared:x}"
                        )]),
                );
            }
        }
    }
}

/// The `@`-suffix unit address is always hex (`spec.md` §4.1 node-name
/// lexeme: `@<hex-digits-or-identifier>`), with or without a `0x` prefix.
fn parse_address_literal(address: &str) -> Result<u64, std::num::ParseIntError> {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    u64::from_str_radix(hex, 16)
}

fn cells_to_u64(cells: &[i64]) -> u64 {
    cells.iter().fold(0u64, |acc, &c| (acc << 32) | (c as u32 as u64))
}

fn check_ranges(
    tree: &RuntimeTree,
    node_ref: NodeRef,
    prop_name: &str,
    files: &[FileAst],
    out: &mut Vec<DtsDiagnostic>,
) {
    let node = tree.get(node_ref);
    let Some(prop) = node.properties.get(prop_name) else {
        return;
    };
    let child_address_cells = address_cells(tree, node_ref) as usize;
    let parent_address_cells = match node.parent {
        Some(parent) => address_cells(tree, parent) as usize,
        None => child_address_cells,
    };
    let size_cells_count = size_cells(tree, node_ref) as usize;
    let triplet = child_address_cells + parent_address_cells + size_cells_count;
    if triplet == 0 {
        return;
    }
    let numbers = numbers_of(prop);
    if numbers.len() % triplet != 0 {
        out.push(
            diag(DiagnosticKind::RegMismatch, files, prop)
                .with_args([format!("'{prop_name}' entry length must be a multiple of {triplet} cells")]),
        );
        return;
    }

    let mut child_ranges = Vec::new();
    let mut parent_ranges = Vec::new();
    for chunk in numbers.chunks(triplet) {
        let child_addr = cells_to_u64(&chunk[0..child_address_cells]);
        let parent_addr =
            cells_to_u64(&chunk[child_address_cells..child_address_cells + parent_address_cells]);
        let size = cells_to_u64(&chunk[child_address_cells + parent_address_cells..]);
        child_ranges.push((child_addr, child_addr.saturating_add(size)));
        parent_ranges.push((parent_addr, parent_addr.saturating_add(size)));
    }

    if ranges_overlap(&child_ranges) {
        out.push(
            diag(DiagnosticKind::RangesOverlap, files, prop)
                .with_args(["child"]),
        );
    }
    if ranges_overlap(&parent_ranges) {
        out.push(
            diag(DiagnosticKind::RangesOverlap, files, prop)
                .with_args(["parent"]),
        );
    }
}

fn ranges_overlap(ranges: &[(u64, u64)]) -> bool {
    let mut sorted: Vec<(u64, u64)> = ranges.to_vec();
    sorted.sort_by_key(|r| r.0);
    sorted.windows(2).any(|w| w[0].1 > w[1].0)
}

fn find_interrupt_parent(tree: &RuntimeTree, node_ref: NodeRef) -> Option<NodeRef> {
    if let Some(prop) = tree.get(node_ref).properties.get("interrupt-parent") {
        if let Some(QuickValue::PhandleRef(name)) = prop.quick_values.first() {
            return tree.labels.get(name).copied();
        }
    }
    tree.get(node_ref).parent.and_then(|parent| {
        if tree.get(parent).properties.contains_key("#interrupt-cells") {
            Some(parent)
        } else {
            find_interrupt_parent(tree, parent)
        }
    })
}

fn check_interrupts(tree: &RuntimeTree, node_ref: NodeRef, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let node = tree.get(node_ref);
    let Some(prop) = node.properties.get("interrupts") else {
        return;
    };
    let Some(interrupt_parent) = find_interrupt_parent(tree, node_ref) else {
        return;
    };
    let cells = tree
        .get(interrupt_parent)
        .properties
        .get("#interrupt-cells")
        .and_then(|p| numbers_of(p).first().copied())
        .unwrap_or(1) as usize;
    if cells == 0 {
        return;
    }
    let numbers = numbers_of(prop);
    if numbers.len() % cells != 0 {
        out.push(
            diag(DiagnosticKind::CellMissMatch, files, prop)
                .with_args(["interrupts", &cells.to_string(), &(numbers.len() % cells).to_string()]),
        );
    }
}

fn check_nexus_map(
    tree: &RuntimeTree,
    node_ref: NodeRef,
    map_name: &str,
    mask_name: &str,
    files: &[FileAst],
    out: &mut Vec<DtsDiagnostic>,
) {
    let node = tree.get(node_ref);
    let Some(prop) = node.properties.get(map_name) else {
        return;
    };
    let _ = node.properties.get(mask_name);

    let own_address_cells = address_cells(tree, node_ref) as usize;
    let own_specifier_cells = tree
        .get(node_ref)
        .properties
        .get("#interrupt-cells")
        .and_then(|p| numbers_of(p).first().copied())
        .unwrap_or(1) as usize;

    let numbers = numbers_of(prop);
    let mut idx = 0usize;
    let mut seen_keys: HashMap<Vec<i64>, ()> = HashMap::new();
    while idx < numbers.len() {
        let child_unit_end = idx + own_address_cells;
        let child_spec_end = child_unit_end + own_specifier_cells;
        if child_spec_end > numbers.len() {
            break;
        }
        let key: Vec<i64> = numbers[idx..child_spec_end].to_vec();
        if seen_keys.insert(key, ()).is_some() {
            out.push(
                diag(DiagnosticKind::DuplicateMapEntry, files, prop)
                    .with_args([map_name]),
            );
        }

        let Some(phandle_cell) = numbers.get(child_spec_end) else {
            break;
        };
        let target = tree.phandles.get(&(*phandle_cell as u32)).copied();
        let parent_specifier_cells = target
            .and_then(|t| tree.get(t).properties.get("#interrupt-cells"))
            .and_then(|p| numbers_of(p).first().copied())
            .unwrap_or(1) as usize;
        let parent_address_cells = target.map(|t| address_cells(tree, t) as usize).unwrap_or(0);

        idx = child_spec_end + 1 + parent_address_cells + parent_specifier_cells;
    }
}

fn check_names_companion(
    node: &crate::runtime::RuntimeNode,
    names_prop: &str,
    values_prop: &str,
    files: &[FileAst],
    out: &mut Vec<DtsDiagnostic>,
) {
    let Some(names) = node.properties.get(names_prop) else {
        return;
    };
    let Some(values) = node.properties.get(values_prop) else {
        return;
    };
    let names_len = strings_of(names).len();
    let values_len = values.values.len().max(numbers_of(values).len());
    if names_len != 0 && values_len != 0 && names_len != values_len {
        out.push(
            diag(DiagnosticKind::CellMissMatch, files, names)
                .with_args([names_prop, &values_len.to_string(), &names_len.to_string()]),
        );
    }
}

fn check_phandle_arrays(tree: &RuntimeTree, node_ref: NodeRef, files: &[FileAst], out: &mut Vec<DtsDiagnostic>) {
    let node = tree.get(node_ref);
    for (name, prop) in &node.properties {
        if !name.ends_with("s") || name == "interrupts" {
            continue;
        }
        let specifier = name.trim_end_matches('s');
        let mut i = 0usize;
        while i < prop.quick_values.len() {
            let QuickValue::PhandleRef(target_name) = &prop.quick_values[i] else {
                i += 1;
                continue;
            };
            let Some(target) = tree.labels.get(target_name).copied() else {
                i += 1;
                continue;
            };
            let cell_count = tree
                .get(target)
                .node_type
                .as_ref()
                .and_then(|t| t.cell_specifiers.get(specifier).copied())
                .unwrap_or(0) as usize;
            let available = prop.quick_values.len() - i - 1;
            if cell_count > available {
                out.push(
                    diag(DiagnosticKind::CellMissMatch, files, prop)
                        .with_args([name.clone(), cell_count.to_string(), available.to_string()]),
                );
                break;
            }
            i += 1 + cell_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::runtime::evaluate;
    use tower_lsp::lsp_types::Url;

    fn check_single(src: &str) -> Vec<DtsDiagnostic> {
        let tokens = Lexer::new(src).tokenize().tokens;
        let ast = Parser::new(&tokens).parse().ast;
        let uri = Url::parse("file:///board.dts").unwrap();
        let files = vec![FileAst { uri, ast }];
        let out = evaluate(&files);
        run_standard_checks(&out.tree, &files)
    }

    #[test]
    fn ranges_overlap_detects_overlapping_windows() {
        assert!(ranges_overlap(&[(0, 10), (5, 15)]));
        assert!(!ranges_overlap(&[(0, 10), (10, 20)]));
    }

    #[test]
    fn cells_to_u64_packs_big_endian() {
        assert_eq!(cells_to_u64(&[0, 0x200]), 0x200);
        assert_eq!(cells_to_u64(&[1, 0]), 1u64 << 32);
    }

    #[test]
    fn s3_reg_matches_parent_address_and_size_cells() {
        let diags = check_single(
            "/{#address-cells=<2>;#size-cells=<1>;compatible=\"\";model=\"\";\
             node1{#address-cells=<1>;#size-cells=<2>;\
             node2@200{reg=<0x200 0 0>;};};};",
        );
        assert!(diags.iter().all(|d| d.kind != DiagnosticKind::RegMismatch));
    }

    #[test]
    fn reg_group_length_mismatch_is_reported() {
        let diags = check_single(
            "/{#address-cells=<1>;#size-cells=<1>;node1@0{reg=<0>;};};",
        );
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::RegMismatch));
    }

    #[test]
    fn status_enum_violation_is_reported() {
        let diags = check_single("/{node1{status=\"bogus\";};};");
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::EnumValueMismatch));
    }

    #[test]
    fn device_type_is_flagged_deprecated() {
        let diags = check_single("/{cpus{cpu{device_type=\"cpu\";};};};");
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::Deprecated));
    }
}
