//! Streams simulation output row-by-row instead of buffering the whole
//! trajectory, so a long run's memory footprint stays flat and a
//! consuming shell pipeline sees rows as they're produced.
//!
//! Projects each configured [`OutputField`](crate::config::OutputField)
//! (a species, compartment, or parameter) onto a CSV column. Compartment
//! sizes and parameter values can be redefined mid-run by an initial
//! assignment or an assignment rule (`system::SystemBuilder::overrides`),
//! so a lookup checks that overlay before falling back to the model's
//! static value.

use crate::config::{FieldKind, OutputField};
use crate::view::ModelView;
use oldies_core::Result;
use std::collections::HashMap;
use std::io::Write;

/// Receives one `(time, species state, rule/assignment overrides)` row at
/// a time.
pub trait Observer {
    fn observe(&mut self, t: f64, state: &[f64]) -> Result<()>;

    /// As `observe`, but with the current compartment/parameter override
    /// overlay available for projecting non-species output fields.
    /// Default implementation ignores `overrides` and delegates to
    /// `observe`, matching callers (tests, the fixed-step drivers' early
    /// iterations) that only ever populate species columns.
    fn observe_with_overrides(
        &mut self,
        t: f64,
        state: &[f64],
        overrides: &HashMap<String, f64>,
    ) -> Result<()> {
        let _ = overrides;
        self.observe(t, state)
    }
}

/// Writes `time,<field1>,<field2>,...` CSV rows to any `Write`r. Header is
/// written on the first call. With no configured fields, every species
/// (in model order) is written, matching the teacher's
/// `StdoutCsvObserver` default.
pub struct CsvObserver<'a, W: Write> {
    writer: W,
    view: &'a ModelView,
    fields: Vec<OutputField>,
    header: Vec<String>,
    wrote_header: bool,
}

impl<'a, W: Write> CsvObserver<'a, W> {
    pub fn new(writer: W, view: &'a ModelView, fields: Vec<OutputField>) -> CsvObserver<'a, W> {
        let fields = if fields.is_empty() {
            view.model.species.iter().map(|s| OutputField::species(s.id.clone())).collect()
        } else {
            fields
        };
        let header = std::iter::once("time".to_string())
            .chain(fields.iter().map(|f| f.id.clone()))
            .collect();
        CsvObserver { writer, view, fields, header, wrote_header: false }
    }

    fn project(&self, field: &OutputField, state: &[f64], overrides: &HashMap<String, f64>) -> f64 {
        match field.kind {
            FieldKind::Species => match self.view.species_index.get(&field.id) {
                Some(&i) => {
                    let species = &self.view.model.species[i];
                    let raw = state[i];
                    if species.should_divide_by_compartment_size() {
                        let size = overrides.get(&species.compartment).copied().unwrap_or_else(|| {
                            self.view
                                .compartment_index
                                .get(&species.compartment)
                                .map(|&ci| self.view.model.compartments[ci].size)
                                .unwrap_or(1.0)
                        });
                        raw / size
                    } else {
                        raw
                    }
                }
                None => 0.0,
            },
            FieldKind::Compartment => overrides.get(&field.id).copied().unwrap_or_else(|| {
                self.view
                    .compartment_index
                    .get(&field.id)
                    .map(|&i| self.view.model.compartments[i].size)
                    .unwrap_or(0.0)
            }),
            FieldKind::Parameter => overrides.get(&field.id).copied().unwrap_or_else(|| {
                self.view
                    .parameter_index
                    .get(&field.id)
                    .map(|&i| self.view.model.parameters[i].value)
                    .unwrap_or(0.0)
            }),
        }
    }

    fn write_row(&mut self, t: f64, values: &[f64]) -> Result<()> {
        if !self.wrote_header {
            writeln!(self.writer, "{}", self.header.join(","))?;
            self.wrote_header = true;
        }
        let mut row = format!("{t}");
        for v in values {
            row.push(',');
            row.push_str(&v.to_string());
        }
        writeln!(self.writer, "{row}")?;
        Ok(())
    }
}

impl<'a, W: Write> Observer for CsvObserver<'a, W> {
    fn observe(&mut self, t: f64, state: &[f64]) -> Result<()> {
        self.observe_with_overrides(t, state, &HashMap::new())
    }

    fn observe_with_overrides(
        &mut self,
        t: f64,
        state: &[f64],
        overrides: &HashMap<String, f64>,
    ) -> Result<()> {
        let values: Vec<f64> =
            self.fields.iter().map(|f| self.project(f, state, overrides)).collect();
        self.write_row(t, &values)
    }
}
