/*!
# Saving chains to CSV

Writes a single-parameter chain as a two-column CSV file (`sample,alpha`),
one row per chain entry, burn-in included.
*/

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;
use ndarray::ArrayView1;

use crate::error::Result;

/**
Writes `chain` to `filename`, creating or truncating it.

# Examples

```rust
use bayes_mcmc::io::csv::save_chain_csv;
use ndarray::arr1;

let chain = arr1(&[3.0, 2.7, 2.7, 2.1]);
save_chain_csv(chain.view(), "/tmp/chain.csv").expect("Expecting saving data to succeed");
```
*/
pub fn save_chain_csv<T: std::fmt::Display>(
    chain: ArrayView1<'_, T>,
    filename: impl AsRef<Path>,
) -> Result<()> {
    write_chain_csv(chain, File::create(filename)?)
}

/// Writes `chain` as CSV to any writer.
pub fn write_chain_csv<T: std::fmt::Display, W: Write>(
    chain: ArrayView1<'_, T>,
    writer: W,
) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["sample", "alpha"])?;
    for (i, value) in chain.iter().enumerate() {
        wtr.write_record([i.to_string(), value.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}
