use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("reference table not found at {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read reference table {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("reference table {} needs at least a code and a description column", .0.display())]
    TooFewColumns(PathBuf),
    #[error("reference table {} has no code rows", .0.display())]
    Empty(PathBuf),
}

/// Code/description rows used to ground both stage prompts.
#[derive(Debug, Clone)]
pub struct CodeTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    code_col: usize,
    desc_col: usize,
}

impl CodeTable {
    pub fn from_csv_reader<R: std::io::Read>(rdr: R, origin: &Path) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(rdr);

        let read_err = |source| TableError::Read {
            path: origin.to_path_buf(),
            source,
        };

        let headers: Vec<String> = reader
            .headers()
            .map_err(read_err)?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.len() < 2 {
            return Err(TableError::TooFewColumns(origin.to_path_buf()));
        }

        let code_col = find_column(&headers, "code").unwrap_or(0);
        let desc_col = find_column(&headers, "desc")
            .filter(|&i| i != code_col)
            .unwrap_or(if code_col == 1 { 0 } else { 1 });

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(read_err)?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            if row[code_col].is_empty() {
                continue;
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(TableError::Empty(origin.to_path_buf()));
        }

        Ok(Self {
            headers,
            rows,
            code_col,
            desc_col,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn description_for(&self, code: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row[self.code_col] == code)
            .map(|row| row[self.desc_col].as_str())
            .filter(|desc| !desc.is_empty())
    }

    /// Renders the table as an aligned plain-text listing, header first, no index.
    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_line(&mut out, &self.headers, &widths);
        for row in &self.rows {
            push_line(&mut out, row, &widths);
        }
        out
    }
}

fn find_column(headers: &[String], needle: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.to_ascii_lowercase().contains(needle))
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        let pad = widths[i].saturating_sub(cell.chars().count());
        line.extend(std::iter::repeat_n(' ', pad));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Where the reference table lives on disk. Every load reads the file again.
#[derive(Debug, Clone)]
pub struct TableSource {
    path: PathBuf,
}

impl TableSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CodeTable, TableError> {
        if !self.path.is_file() {
            return Err(TableError::Missing(self.path.clone()));
        }
        let file = std::fs::File::open(&self.path).map_err(|e| TableError::Read {
            path: self.path.clone(),
            source: csv::Error::from(e),
        })?;
        CodeTable::from_csv_reader(file, &self.path)
    }

    /// Load for a stage instance. A failure is logged and leaves the stage
    /// without a table, which it reports as unavailable data on use.
    pub fn load_for_stage(&self, stage: &str) -> Option<Arc<CodeTable>> {
        match self.load() {
            Ok(table) => Some(Arc::new(table)),
            Err(err) => {
                tracing::warn!(stage, error = %err, "reference table unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_table() -> CodeTable {
    let csv = "CPT Code,Description\n\
        52000,Cystourethroscopy\n\
        51725,Simple cystometrogram\n\
        51797,\"Voiding pressure studies, intra-abdominal\"\n";
    CodeTable::from_csv_reader(csv.as_bytes(), Path::new("sample.csv")).unwrap()
}
