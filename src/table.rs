//! Tabular view over fetched data: shape, column names and rendering to
//! aligned text, CSV or JSON.

use crate::data_structures::{
    OptionContract, OptionTable, PriceHistory, OPTION_COLUMNS, PRICE_COLUMNS,
};
use serde::Serialize;
use std::io::Write;

pub trait Tabular: Serialize {
    fn type_name(&self) -> &'static str;

    fn columns(&self) -> Vec<String>;

    fn row_count(&self) -> usize;

    /// Cells as display strings, one `Vec` per row in column order
    fn rows(&self) -> Vec<Vec<String>>;

    /// `(rows, columns)`
    fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.columns().len())
    }
}

impl Tabular for PriceHistory {
    fn type_name(&self) -> &'static str {
        "PriceHistory"
    }

    fn columns(&self) -> Vec<String> {
        PRICE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn row_count(&self) -> usize {
        self.bars.len()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.bars
            .iter()
            .map(|bar| {
                vec![
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.open.to_string(),
                    bar.high.to_string(),
                    bar.low.to_string(),
                    bar.close.to_string(),
                    bar.adjclose.to_string(),
                    bar.volume.to_string(),
                    bar.ticker.clone(),
                ]
            })
            .collect()
    }
}

fn opt_cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn contract_row(contract: &OptionContract) -> Vec<String> {
    vec![
        contract.contract_name.clone(),
        opt_cell(
            contract
                .last_trade_date
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
        ),
        contract.strike.to_string(),
        opt_cell(contract.last_price),
        opt_cell(contract.bid),
        opt_cell(contract.ask),
        opt_cell(contract.change),
        opt_cell(contract.percent_change.map(|p| format!("{:+.2}%", p))),
        opt_cell(contract.volume),
        opt_cell(contract.open_interest),
        opt_cell(contract.implied_volatility.map(|iv| format!("{:.2}%", iv))),
    ]
}

impl Tabular for OptionTable {
    fn type_name(&self) -> &'static str {
        "OptionTable"
    }

    fn columns(&self) -> Vec<String> {
        OPTION_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn row_count(&self) -> usize {
        self.contracts.len()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.contracts.iter().map(contract_row).collect()
    }
}

/// Render as aligned columns. When there are more than `max_rows` rows only
/// the head and tail are shown, separated by `...`.
pub fn render_text<T: Tabular + ?Sized>(table: &T, max_rows: usize) -> String {
    let columns = table.columns();
    let rows = table.rows();
    let total = rows.len();

    let shown: Vec<Option<&Vec<String>>> = if max_rows > 0 && total > max_rows {
        let head = max_rows.div_ceil(2);
        let tail = max_rows - head;
        rows[..head]
            .iter()
            .map(Some)
            .chain(std::iter::once(None))
            .chain(rows[total - tail..].iter().map(Some))
            .collect()
    } else {
        rows.iter().map(Some).collect()
    };

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in shown.iter().flatten() {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:>width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = String::new();
    out.push_str(&format_line(&columns));
    out.push('\n');
    for row in &shown {
        match row {
            Some(cells) => out.push_str(&format_line(cells)),
            None => {
                let dots = vec!["...".to_string(); columns.len()];
                out.push_str(&format_line(&dots));
            }
        }
        out.push('\n');
    }
    out.push_str(&format!("[{} rows x {} columns]", total, columns.len()));
    out
}

/// Write a header row followed by one record per row
pub fn write_csv<T: Tabular + ?Sized, W: Write>(table: &T, writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_json<T: Tabular + ?Sized>(table: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(table)
}
