use std::io::{self, Write};

use equiforge::nn::LayerBuilder;
use equiforge::{GraphModule, IrrepsDict, ModelBuilder};

use crate::util::text::truncate;

const INDENT: &str = "      ";

const BOX_INNER_WIDTH: usize = 62;
const SAFE_TABLE_WIDTH: usize = BOX_INNER_WIDTH - INDENT.len();

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

struct Column {
    header: &'static str,
    width: usize,
    align: Align,
}

impl Column {
    fn left(header: &'static str, width: usize) -> Self {
        Self {
            header,
            width,
            align: Align::Left,
        }
    }

    fn right(header: &'static str, width: usize) -> Self {
        Self {
            header,
            width,
            align: Align::Right,
        }
    }
}

/// Box-drawn table; the last column grows to fill the remaining width.
struct Table {
    title: String,
    columns: Vec<Column>,
}

impl Table {
    fn new(title: &str, mut columns: Vec<Column>) -> Self {
        let fixed: usize = columns.iter().rev().skip(1).map(|c| c.width).sum();
        let overhead = 3 * columns.len() + 1;
        if let Some(last) = columns.last_mut() {
            last.width = SAFE_TABLE_WIDTH.saturating_sub(fixed + overhead).max(last.width);
        }
        Self {
            title: title.to_string(),
            columns,
        }
    }

    fn rule(&self, out: &mut impl Write, left: char, mid: char, right: char) {
        let segments: Vec<String> = self.columns.iter().map(|c| "─".repeat(c.width + 2)).collect();
        let _ = writeln!(
            out,
            "{}{}{}{}",
            INDENT,
            left,
            segments.join(&mid.to_string()),
            right
        );
    }

    fn line(&self, out: &mut impl Write, cells: &[&str]) {
        let rendered: Vec<String> = self
            .columns
            .iter()
            .zip(cells)
            .map(|(col, cell)| {
                let cell = truncate(cell, col.width);
                match col.align {
                    Align::Left => format!(" {:<w$} ", cell, w = col.width),
                    Align::Right => format!(" {:>w$} ", cell, w = col.width),
                }
            })
            .collect();
        let _ = writeln!(out, "{}│{}│", INDENT, rendered.join("│"));
    }

    fn print(&self, rows: &[Vec<String>]) {
        let stderr = io::stderr();
        let mut out = stderr.lock();

        let _ = writeln!(
            out,
            "{}┌─ {} ─┐",
            INDENT,
            truncate(&self.title, SAFE_TABLE_WIDTH - 6)
        );
        self.rule(&mut out, '┌', '┬', '┐');
        let headers: Vec<&str> = self.columns.iter().map(|c| c.header).collect();
        self.line(&mut out, &headers);
        self.rule(&mut out, '├', '┼', '┤');
        for row in rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            self.line(&mut out, &cells);
        }
        self.rule(&mut out, '└', '┴', '┘');
    }
}

pub fn print_config_summary(rows: &[(&str, String)]) {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|(key, value)| vec![key.to_string(), value.clone()])
        .collect();
    Table::new(
        "Configuration",
        vec![Column::left("Setting", 16), Column::right("Value", 0)],
    )
    .print(&rows);
}

/// Lists each layer of a sequential model with the fields it produces.
pub fn print_model(model: &dyn GraphModule) {
    let rows: Vec<Vec<String>> = match model.as_sequential() {
        Some(seq) => seq
            .iter()
            .map(|(name, module)| {
                vec![
                    name.to_string(),
                    module.type_name().to_string(),
                    produced_fields(module).join(", "),
                ]
            })
            .collect(),
        None => vec![vec![
            "-".to_string(),
            model.type_name().to_string(),
            produced_fields(model).join(", "),
        ]],
    };

    Table::new(
        "Model Layers",
        vec![
            Column::left("Layer", 22),
            Column::left("Module", 24),
            Column::left("Produces", 28),
        ],
    )
    .print(&rows);
}

pub fn print_signature(title: &str, signature: &IrrepsDict) {
    let rows: Vec<Vec<String>> = signature
        .iter()
        .map(|(field, irreps)| {
            let irreps = irreps.map_or_else(|| "None".to_string(), |i| i.to_string());
            vec![field.to_string(), irreps]
        })
        .collect();
    Table::new(
        title,
        vec![Column::left("Field", 18), Column::left("Irreps", 0)],
    )
    .print(&rows);
}

pub fn print_builders<'a>(builders: impl Iterator<Item = (&'a str, &'a ModelBuilder)>) {
    let rows: Vec<Vec<String>> = builders
        .map(|(path, builder)| {
            let slots: Vec<String> = builder.accepts.iter().map(|s| s.to_string()).collect();
            vec![path.to_string(), slots.join(", ")]
        })
        .collect();
    Table::new(
        "Model Builders",
        vec![Column::left("Name", 36), Column::left("Accepts", 24)],
    )
    .print(&rows);
}

/// Required parameters are marked with `*`.
pub fn print_layers<'a>(layers: impl Iterator<Item = (&'a str, &'a LayerBuilder)>) {
    let rows: Vec<Vec<String>> = layers
        .map(|(path, builder)| {
            let params: Vec<String> = builder
                .params
                .iter()
                .filter(|p| p.name != "irreps_in")
                .map(|p| {
                    if p.required {
                        format!("{}*", p.name)
                    } else {
                        p.name.to_string()
                    }
                })
                .collect();
            let short = path.rsplit('.').next().unwrap_or(path);
            vec![short.to_string(), params.join(" ")]
        })
        .collect();
    Table::new(
        "Layers",
        vec![Column::left("Name", 26), Column::left("Parameters", 30)],
    )
    .print(&rows);
}

fn produced_fields(module: &dyn GraphModule) -> Vec<String> {
    module
        .irreps_out()
        .iter()
        .filter(|&(field, irreps)| module.irreps_in().get(field) != Some(irreps))
        .map(|(field, _)| field.to_string())
        .collect()
}
