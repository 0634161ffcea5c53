//! Asset selection from a package's file list
//!
//! Framework-specific folders (`lib/<tfm>/`, `ref/<tfm>/`, `contentFiles/<lang>/<tfm>/`)
//! are matched with [`FrameworkMoniker::nearest`]. Files placed directly in
//! `lib/` or `ref/` count as framework-neutral.

use crate::graph::AssetGroups;
use lockstep_model::FrameworkMoniker;
use std::collections::BTreeSet;

const ASSEMBLY_EXTENSIONS: &[&str] = &[".dll", ".exe", ".winmd"];
const EMPTY_FOLDER_MARKER: &str = "_._";

/// Select every asset group of `package_id` for `framework`
pub fn select_assets(package_id: &str, files: &[String], framework: &FrameworkMoniker) -> AssetGroups {
    let reference = framework_items(files, "ref", framework, is_assembly);
    let lib = framework_items(files, "lib", framework, is_assembly);

    AssetGroups {
        compile: if reference.is_empty() {
            lib.clone()
        } else {
            reference
        },
        runtime: lib,
        native: files
            .iter()
            .filter(|f| {
                let parts: Vec<&str> = f.split('/').collect();
                parts.len() > 3 && parts[0] == "runtimes" && parts[2] == "native"
            })
            .cloned()
            .collect(),
        build: build_items(files, "build", package_id, framework),
        build_multitargeting: build_items(files, "buildMultiTargeting", package_id, framework),
        content_files: content_items(files, framework),
        analyzers: files
            .iter()
            .filter(|f| f.starts_with("analyzers/") && f.ends_with(".dll"))
            .cloned()
            .collect(),
    }
}

/// Whether `files` offer anything for `framework`. A package without any
/// `lib/` or `ref/` file is compatible everywhere.
pub fn is_compatible(package_id: &str, files: &[String], framework: &FrameworkMoniker) -> bool {
    let selected = select_assets(package_id, files, framework);
    let has_assets = !selected.compile.is_empty()
        || !selected.runtime.is_empty()
        || !selected.content_files.is_empty()
        || !selected.build.is_empty()
        || !selected.build_multitargeting.is_empty();
    has_assets || !files.iter().any(|f| is_assembly_folder(f))
}

/// Frameworks of the `lib/` and `ref/` folders, for error messages
pub fn assembly_frameworks(files: &[String]) -> BTreeSet<FrameworkMoniker> {
    files
        .iter()
        .filter_map(|f| folder_framework(f, "lib").or_else(|| folder_framework(f, "ref")))
        .filter(|tfm| *tfm != FrameworkMoniker::any())
        .collect()
}

fn is_assembly_folder(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("lib/") || lower.starts_with("ref/")
}

fn is_assembly(file_name: &str) -> bool {
    file_name == EMPTY_FOLDER_MARKER
        || ASSEMBLY_EXTENSIONS
            .iter()
            .any(|ext| file_name.to_ascii_lowercase().ends_with(ext))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Folder framework of `root/<tfm>/file`; `any` for `root/file`
fn folder_framework(path: &str, root: &str) -> Option<FrameworkMoniker> {
    let rest = path.strip_prefix(root)?.strip_prefix('/')?;
    match rest.split_once('/') {
        Some((folder, _)) => FrameworkMoniker::parse(folder).ok(),
        None => Some(FrameworkMoniker::any()),
    }
}

fn framework_items(
    files: &[String],
    root: &str,
    framework: &FrameworkMoniker,
    accept: fn(&str) -> bool,
) -> Vec<String> {
    let tagged: Vec<(FrameworkMoniker, &String)> = files
        .iter()
        .filter_map(|f| folder_framework(f, root).map(|tfm| (tfm, f)))
        .collect();
    let folders: BTreeSet<&FrameworkMoniker> = tagged.iter().map(|(tfm, _)| tfm).collect();
    let Some(nearest) = framework.nearest(folders.iter().copied()) else {
        return Vec::new();
    };

    tagged
        .iter()
        .filter(|(tfm, f)| tfm == nearest && accept(file_name(f)))
        .map(|(_, f)| (*f).clone())
        .collect()
}

/// `.props`/`.targets` named after the package, from the root folder or the
/// nearest framework folder
fn build_items(
    files: &[String],
    root: &str,
    package_id: &str,
    framework: &FrameworkMoniker,
) -> Vec<String> {
    let named_after_package = |name: &str| {
        let lower = name.to_ascii_lowercase();
        let id = package_id.to_ascii_lowercase();
        lower == format!("{}.props", id) || lower == format!("{}.targets", id)
    };
    framework_items(files, root, framework, |_| true)
        .into_iter()
        .filter(|f| named_after_package(file_name(f)))
        .collect()
}

/// `contentFiles/<lang>/<tfm|any>/...` for the nearest framework folder
fn content_items(files: &[String], framework: &FrameworkMoniker) -> Vec<String> {
    let tagged: Vec<(FrameworkMoniker, &String)> = files
        .iter()
        .filter_map(|f| {
            let mut parts = f.splitn(4, '/');
            if parts.next()? != "contentFiles" {
                return None;
            }
            let _language = parts.next()?;
            let folder = parts.next()?;
            parts.next()?;
            FrameworkMoniker::parse(folder).ok().map(|tfm| (tfm, f))
        })
        .collect();
    let folders: BTreeSet<&FrameworkMoniker> = tagged.iter().map(|(tfm, _)| tfm).collect();
    let Some(nearest) = framework.nearest(folders.iter().copied()) else {
        return Vec::new();
    };
    tagged
        .iter()
        .filter(|(tfm, _)| tfm == nearest)
        .map(|(_, f)| (*f).clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn tfm(s: &str) -> FrameworkMoniker {
        FrameworkMoniker::parse(s).unwrap()
    }

    #[test]
    fn test_ref_wins_for_compile() {
        let list = files(&[
            "lib/net6.0/A.dll",
            "lib/net6.0/A.xml",
            "lib/netstandard2.0/A.dll",
            "ref/net6.0/A.dll",
        ]);
        let assets = select_assets("A", &list, &tfm("net8.0"));
        assert_eq!(assets.compile, vec!["ref/net6.0/A.dll"]);
        assert_eq!(assets.runtime, vec!["lib/net6.0/A.dll"]);
    }

    #[test]
    fn test_netstandard_folder_for_framework() {
        let list = files(&["lib/netstandard2.0/A.dll", "lib/net8.0/A.dll"]);
        let assets = select_assets("A", &list, &tfm("net472"));
        assert_eq!(assets.compile, vec!["lib/netstandard2.0/A.dll"]);
    }

    #[test]
    fn test_build_and_content_groups() {
        let list = files(&[
            "build/A.targets",
            "build/Other.targets",
            "buildMultiTargeting/A.props",
            "contentFiles/cs/any/Helper.cs",
            "contentFiles/cs/net45/Old.cs",
            "runtimes/win-x64/native/a.dll",
            "analyzers/dotnet/cs/A.Analyzers.dll",
        ]);
        let assets = select_assets("A", &list, &tfm("net8.0"));
        assert_eq!(assets.build, vec!["build/A.targets"]);
        assert_eq!(assets.build_multitargeting, vec!["buildMultiTargeting/A.props"]);
        assert_eq!(assets.content_files, vec!["contentFiles/cs/any/Helper.cs"]);
        assert_eq!(assets.native, vec!["runtimes/win-x64/native/a.dll"]);
        assert_eq!(assets.analyzers, vec!["analyzers/dotnet/cs/A.Analyzers.dll"]);
        assert!(assets.compile.is_empty());
    }

    #[test]
    fn test_incompatible_folders_select_nothing() {
        let list = files(&["lib/net8.0/A.dll"]);
        let assets = select_assets("A", &list, &tfm("net472"));
        assert!(assets.is_empty());
    }

    #[test]
    fn test_compatibility() {
        let newer_only = files(&["lib/net9.0/A.dll", "ref/net9.0/A.dll"]);
        assert!(!is_compatible("A", &newer_only, &tfm("net8.0")));
        assert!(is_compatible("A", &newer_only, &tfm("net9.0")));
        assert_eq!(
            assembly_frameworks(&newer_only).into_iter().collect::<Vec<_>>(),
            vec![tfm("net9.0")]
        );

        let marker = files(&["lib/net9.0/A.dll", "lib/net8.0/_._"]);
        assert!(is_compatible("A", &marker, &tfm("net8.0")));

        let meta = files(&["README.md"]);
        assert!(is_compatible("A", &meta, &tfm("net472")));
        assert!(is_compatible("A", &[], &tfm("net472")));

        let build_only = files(&["lib/net9.0/A.dll", "build/A.targets"]);
        assert!(is_compatible("A", &build_only, &tfm("net8.0")));
    }
}
