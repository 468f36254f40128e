use std::path::Path;

use anyhow::{Context, Result, bail};
use regionc_method::{MethodCatalog, MethodId};
use regionc_utils::fs::{LineFilter, read_lines};

/// Reads `<module> <index> <signature>` lines into a fresh catalog.
pub fn load_catalog(path: &Path) -> Result<MethodCatalog> {
    let lines = read_lines(path, LineFilter::SkipBlankAndComments)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;

    let catalog = MethodCatalog::new();
    for (idx, line) in lines.iter().enumerate() {
        let mut fields = line.splitn(3, ' ');
        let (Some(module), Some(index), Some(signature)) =
            (fields.next(), fields.next(), fields.next())
        else {
            bail!("{}:{}: expected `<module> <index> <signature>`", path.display(), idx + 1);
        };
        let module = module
            .parse()
            .with_context(|| format!("{}:{}: invalid module id", path.display(), idx + 1))?;
        let index = index
            .parse()
            .with_context(|| format!("{}:{}: invalid method index", path.display(), idx + 1))?;
        catalog.register(MethodId::new(module, index), signature.trim());
    }
    Ok(catalog)
}
