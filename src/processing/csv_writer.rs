use crate::discretization::mesh::Mesh;
use crate::numerics::krylov::KrylovReport;
use nalgebra::DVector;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Write column data to a CSV file with headers. Shorter columns leave
/// trailing cells empty.
pub fn write_csv<P: AsRef<Path>>(path: P, headers: &[&str], data: &[Vec<f64>]) -> io::Result<()> {
    if !headers.is_empty() && !data.is_empty() && headers.len() != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Headers count ({}) doesn't match data columns ({})",
                headers.len(),
                data.len()
            ),
        ));
    }

    let mut file = File::create(path)?;
    writeln!(file, "{}", headers.join(","))?;

    let n_rows = data.iter().map(|col| col.len()).max().unwrap_or(0);
    for i in 0..n_rows {
        let row: Vec<String> = data
            .iter()
            .map(|col| col.get(i).map(|v| format!("{v:.15e}")).unwrap_or_default())
            .collect();
        writeln!(file, "{}", row.join(","))?;
    }

    Ok(())
}

/// Cell-wise fields (`x, y, z` of the centroid followed by one column per
/// field) for plotting.
pub fn write_cell_fields<P: AsRef<Path>>(
    path: P,
    mesh: &Mesh,
    names: &[&str],
    fields: &[&DVector<f64>],
) -> io::Result<()> {
    if let Some(bad) = fields.iter().find(|f| f.len() != mesh.num_cells()) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("field has {} entries, mesh has {} cells", bad.len(), mesh.num_cells()),
        ));
    }

    let mut headers = vec!["x", "y", "z"];
    headers.extend_from_slice(names);
    let mut columns: Vec<Vec<f64>> = (0..3)
        .map(|d| mesh.cells.iter().map(|c| c.centroid[d]).collect())
        .collect();
    columns.extend(fields.iter().map(|f| f.as_slice().to_vec()));
    write_csv(path, &headers, &columns)
}

/// Relative Krylov residuals of one inner solve, indexed by iteration.
pub fn write_residual_history<P: AsRef<Path>>(path: P, report: &KrylovReport) -> io::Result<()> {
    let iterations: Vec<f64> = (1..=report.residual_history.len()).map(|i| i as f64).collect();
    write_csv(
        path,
        &["iteration", "relative_residual"],
        &[iterations, report.residual_history.clone()],
    )
}
