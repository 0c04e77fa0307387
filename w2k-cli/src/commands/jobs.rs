//! Jobs command implementation

use super::Library;
use anyhow::Result;
use w2k_core::Store;

/// List export jobs, oldest first
pub async fn jobs(library: &Library, json: bool) -> Result<()> {
    let jobs = library.store.list_jobs().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    for job in &jobs {
        println!(
            "{}  book {:>4}  {:<10}  {}  {}",
            job.id,
            job.book_id,
            job.range.to_string(),
            job.created_at.format("%Y-%m-%d %H:%M"),
            job.status
        );
    }
    println!("{} jobs", jobs.len());

    Ok(())
}
