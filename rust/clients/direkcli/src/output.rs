//! Table and JSON rendering of command results.

use crate::errors::CliResult;
use direktiv_api::types::{
    Instance, InstanceLogs, Instances, Namespaces, Registries, Secrets, Workflow, Workflows,
};
use serde::Serialize;
use std::io::Write;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }

    /// Writes a query result, as a table or as pretty-printed JSON.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> CliResult<()>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self {
            Self::Json => write_json(writer, value),
            Self::Table => value.write_table(writer),
        }
    }

    /// Writes the result of a mutation: the one-line `message` in table mode, the response in JSON mode.
    pub fn write_outcome<W, T>(&self, writer: &mut W, value: &T, message: &str) -> CliResult<()>
    where
        W: Write,
        T: Serialize,
    {
        match self {
            Self::Json => write_json(writer, value),
            Self::Table => {
                writeln!(writer, "{message}")?;
                Ok(())
            }
        }
    }
}

fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)?;
    Ok(())
}

pub trait TableDisplay {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()>;
}

/// Left-aligned columns, each as wide as its widest cell.
fn write_rows<W: Write>(writer: &mut W, headers: &[&str], rows: &[Vec<String>]) -> CliResult<()> {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(writer, "{}", line(headers.to_vec()))?;
    writeln!(writer, "{}", line(dashes.iter().map(String::as_str).collect()))?;
    for row in rows {
        writeln!(writer, "{}", line(row.iter().map(String::as_str).collect()))?;
    }
    Ok(())
}

impl TableDisplay for Namespaces {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        if self.namespaces.is_empty() {
            writeln!(writer, "No namespaces exist")?;
            return Ok(());
        }
        let rows: Vec<_> = self.namespaces.iter().map(|n| vec![n.name.clone()]).collect();
        write_rows(writer, &["NAME"], &rows)
    }
}

/// A result listed under one namespace, so the empty message can name it.
pub struct InNamespace<'a, T> {
    pub namespace: &'a str,
    pub value: &'a T,
}

impl<T: Serialize> Serialize for InNamespace<'_, T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl TableDisplay for InNamespace<'_, Workflows> {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        let workflows = &self.value.workflows;
        if workflows.is_empty() {
            writeln!(writer, "No workflows exist under '{}'", self.namespace)?;
            return Ok(());
        }
        let rows: Vec<_> = workflows
            .iter()
            .map(|w| {
                vec![
                    w.id.clone(),
                    w.active.to_string(),
                    w.description.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_rows(writer, &["ID", "ACTIVE", "DESCRIPTION"], &rows)
    }
}

impl TableDisplay for InNamespace<'_, Instances> {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        let instances = &self.value.instances;
        if instances.is_empty() {
            writeln!(writer, "No instances exist under '{}'", self.namespace)?;
            return Ok(());
        }
        let rows: Vec<_> = instances
            .iter()
            .map(|i| vec![i.id.clone(), i.status.clone()])
            .collect();
        write_rows(writer, &["ID", "STATUS"], &rows)
    }
}

impl TableDisplay for InNamespace<'_, Secrets> {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        let secrets = &self.value.secrets;
        if secrets.is_empty() {
            writeln!(writer, "No secrets exist under '{}'", self.namespace)?;
            return Ok(());
        }
        let rows: Vec<_> = secrets.iter().map(|s| vec![s.name.clone()]).collect();
        write_rows(writer, &["NAME"], &rows)
    }
}

impl TableDisplay for InNamespace<'_, Registries> {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        let registries = &self.value.registries;
        if registries.is_empty() {
            writeln!(writer, "No registries exist under '{}'", self.namespace)?;
            return Ok(());
        }
        let rows: Vec<_> = registries.iter().map(|r| vec![r.name.clone()]).collect();
        write_rows(writer, &["NAME"], &rows)
    }
}

impl TableDisplay for Workflow {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        writeln!(writer, "{}", String::from_utf8_lossy(&self.workflow).trim_end())?;
        Ok(())
    }
}

impl TableDisplay for Instance {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        writeln!(writer, "ID: {}", self.id)?;
        writeln!(writer, "Status: {}", self.status)?;
        if let Some(invoked_by) = &self.invoked_by {
            writeln!(writer, "Invoked by: {invoked_by}")?;
        }
        if let Some(begin) = &self.begin_time {
            writeln!(writer, "Started: {begin}")?;
        }
        if let Some(end) = &self.end_time {
            writeln!(writer, "Ended: {end}")?;
        }
        writeln!(writer, "Input: {}", String::from_utf8_lossy(&self.input))?;
        writeln!(writer, "Output: {}", String::from_utf8_lossy(&self.output))?;
        if let Some(code) = &self.error_code {
            writeln!(
                writer,
                "Error: [{code}] {}",
                self.error_message.as_deref().unwrap_or_default()
            )?;
        }
        Ok(())
    }
}

impl TableDisplay for InstanceLogs {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        for entry in &self.logs {
            match &entry.timestamp {
                Some(ts) => writeln!(writer, "{ts} {}", entry.message)?,
                None => writeln!(writer, "{}", entry.message)?,
            }
        }
        Ok(())
    }
}
