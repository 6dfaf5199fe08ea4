use anyhow::Result;

use crate::cargo;

/// Crates checked in isolation, with the extra features each must build with.
const PACKAGES: &[(&str, &[&str])] = &[
    ("courier-common", &[]),
    ("courier-common", &["test-utils"]),
    ("courier-domain", &[]),
    ("courier-core", &[]),
    ("courier-infra", &[]),
];

/// Check that every crate compiles without features unified from its siblings.
pub fn check_each_package() -> Result<()> {
    for (index, (package, features)) in PACKAGES.iter().enumerate() {
        let joined = features.join(",");
        let mut args = vec!["check", "-p", *package];
        if !features.is_empty() {
            args.extend(["--features", joined.as_str()]);
        }

        println!("\n[{}/{}] cargo {}", index + 1, PACKAGES.len(), args.join(" "));
        cargo(&args)?;
    }

    println!("\nAll {} package checks passed", PACKAGES.len());
    Ok(())
}
