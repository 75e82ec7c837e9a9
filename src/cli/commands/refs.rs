//! branches / tags commands - List ref names

use std::path::Path;

use anyhow::Result;

use super::open;

pub fn branches(repo: &Path) -> Result<()> {
    for name in open(repo)?.branch_names()? {
        println!("{}", name);
    }
    Ok(())
}

pub fn tags(repo: &Path) -> Result<()> {
    for name in open(repo)?.tag_names()? {
        println!("{}", name);
    }
    Ok(())
}
