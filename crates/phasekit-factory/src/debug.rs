//! Dry-run creation traces and the factory dump.

use core::fmt::Write as _;

use phasekit_types::Verbosity;
use serde::Serialize;

use crate::factory::{CONTEXT, Factory, OverrideKind, RecordRef, full_inst_path};
use crate::proxy::{Products, TypeHandle, display_type_name};

/// One override that matched during a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// Table the record lives in.
    pub kind: OverrideKind,
    /// Instance scope, `*` for type overrides.
    pub scope: String,
    /// Original type name.
    pub orig: String,
    /// Override type name.
    pub ovrd: String,
    /// Whether the search followed this record.
    pub selected: bool,
}

/// What a creation request would produce, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationTrace {
    /// The type that was requested.
    pub requested: String,
    /// Full instance path of the request.
    pub full_inst_path: String,
    /// Every override that matched at any step of the search.
    pub matches: Vec<TraceEntry>,
    /// Name of the type that would be created, if any.
    pub result: Option<String>,
}

impl CreationTrace {
    /// Names of the selected records' override types, in the order they
    /// were applied.
    pub fn chain(&self) -> Vec<&str> {
        self.matches
            .iter()
            .filter(|m| m.selected)
            .map(|m| m.ovrd.as_str())
            .collect()
    }

    /// Human-readable rendering.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Request for type '{}' at path '{}'",
            self.requested, self.full_inst_path
        );
        if self.matches.is_empty() {
            out.push_str(": no overrides apply.\n");
        } else {
            out.push_str(" matched these overrides ('x' = ignored):\n");
            for m in &self.matches {
                let mark = if m.selected { ' ' } else { 'x' };
                let kind = match m.kind {
                    OverrideKind::Instance => "inst",
                    OverrideKind::Type => "type",
                };
                let _ = writeln!(
                    out,
                    "  {mark} {kind} {} -> {} @ {}",
                    m.orig, m.ovrd, m.scope
                );
            }
        }
        match &self.result {
            Some(result) => {
                let _ = writeln!(out, "Result: the factory will produce '{result}'.");
            }
            None => out.push_str("Result: nothing can be produced.\n"),
        }
        out
    }
}

impl<P: Products> Factory<P> {
    /// Dry-run a by-type creation and report every override considered.
    pub fn debug_create_by_type(
        &mut self,
        requested: &TypeHandle<P>,
        parent_inst_path: &str,
        name: &str,
    ) -> CreationTrace {
        let path = full_inst_path(parent_inst_path, name);
        self.begin_debug();
        let result = self.find_override_by_type(requested, &path);
        self.finish_debug(requested.display_name(), path, result.as_ref())
    }

    /// Dry-run a by-name creation and report every override considered.
    pub fn debug_create_by_name(
        &mut self,
        requested_type_name: &str,
        parent_inst_path: &str,
        name: &str,
    ) -> CreationTrace {
        let path = full_inst_path(parent_inst_path, name);
        self.begin_debug();
        let result = self.find_override_by_name(requested_type_name, &path);
        self.finish_debug(display_type_name(requested_type_name), path, result.as_ref())
    }

    fn begin_debug(&mut self) {
        for record in self
            .type_overrides
            .iter_mut()
            .chain(self.inst_overrides.iter_mut())
        {
            record.selected = false;
        }
        self.debug_matches = Some(Vec::new());
    }

    fn finish_debug(
        &mut self,
        requested: &str,
        full_inst_path: String,
        result: Option<&TypeHandle<P>>,
    ) -> CreationTrace {
        let refs = self.debug_matches.take().unwrap_or_default();
        let matches = refs
            .iter()
            .filter_map(|&r| self.trace_entry(r))
            .collect();
        let trace = CreationTrace {
            requested: requested.to_owned(),
            full_inst_path,
            matches,
            result: result.map(|h| h.display_name().to_owned()),
        };
        self.reporter
            .info("FACTDBG", &trace.render(), CONTEXT, Verbosity::None);
        trace
    }

    fn trace_entry(&self, r: RecordRef) -> Option<TraceEntry> {
        let record = self.record(r)?;
        Some(TraceEntry {
            kind: r.kind,
            scope: record.scope().to_owned(),
            orig: record.orig.display_name().to_owned(),
            ovrd: record.ovrd.display_name().to_owned(),
            selected: record.selected,
        })
    }

    /// Dump the override tables and, with `all_types`, every registered
    /// type name. The dump is reported and returned.
    pub fn print(&self, all_types: bool) -> String {
        let mut out = String::from("#### Factory Configuration (*)\n\n");

        if self.inst_overrides.is_empty() && self.type_overrides.is_empty() {
            out.push_str("No instance or type overrides are registered with this factory\n");
        }

        if !self.inst_overrides.is_empty() {
            let rows: Vec<[&str; 3]> = self
                .inst_overrides
                .iter()
                .map(|r| [r.orig.display_name(), r.scope(), r.ovrd.display_name()])
                .collect();
            out.push_str("Instance Overrides:\n\n");
            render_table(
                &mut out,
                ["Requested Type", "Override Path", "Override Type"],
                &rows,
            );
            out.push('\n');
        }

        if !self.type_overrides.is_empty() {
            let rows: Vec<[&str; 2]> = self
                .type_overrides
                .iter()
                .map(|r| [r.orig.display_name(), r.ovrd.display_name()])
                .collect();
            out.push_str("Type Overrides:\n\n");
            render_table(&mut out, ["Requested Type", "Override Type"], &rows);
            out.push('\n');
        }

        if all_types {
            let _ = writeln!(
                out,
                "All types registered with the factory: {} total",
                self.types.len()
            );
            let mut names: Vec<&str> = self.type_names.keys().map(String::as_str).collect();
            if self.types.iter().any(|t| t.type_name().is_empty()) {
                names.push("<unknown>");
            }
            if !names.is_empty() {
                let rows: Vec<[&str; 1]> = names.into_iter().map(|n| [n]).collect();
                render_table(&mut out, ["Type Name"], &rows);
            }
            out.push('\n');
        }

        out.push_str("(*) Types with no associated type name will be printed as <unknown>\n");
        self.reporter
            .info("FACTORY", &out, CONTEXT, Verbosity::None);
        out
    }
}

fn render_table<const N: usize>(out: &mut String, header: [&str; N], rows: &[[&str; N]]) {
    let mut widths = header.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |out: &mut String, cells: [&str; N]| {
        out.push(' ');
        for (cell, width) in cells.iter().zip(widths) {
            let _ = write!(out, " {cell:<width$}");
        }
        let trimmed = out.trim_end_matches(' ').len();
        out.truncate(trimmed);
        out.push('\n');
    };
    let dashes = widths.map(|w| "-".repeat(w));
    line(out, header);
    line(out, dashes.each_ref().map(String::as_str));
    for row in rows {
        line(out, *row);
    }
}
