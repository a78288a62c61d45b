//! npm command-line construction.

use npmx_core::error::{Error, Result};
use npmx_core::{CommandDescriptor, CommandKind, DependencyType};

/// Flag that records the change in the matching manifest section.
fn save_flag(dependency_type: DependencyType) -> &'static str {
    match dependency_type {
        DependencyType::Standard => "--save",
        DependencyType::Development => "--save-dev",
        DependencyType::Optional => "--save-optional",
    }
}

/// Builds the npm arguments (without the executable) for a descriptor.
pub fn build_arguments(descriptor: &CommandDescriptor) -> Result<Vec<String>> {
    let mut args = vec![descriptor.kind().to_string()];

    match descriptor.kind() {
        CommandKind::Install => {
            let name = target(descriptor)?;
            args.push(match descriptor.version_range() {
                Some(range) => format!("{}@{}", name, range),
                None => name.to_string(),
            });
            args.push(scope_flag(descriptor).to_string());
        }
        CommandKind::Uninstall => {
            args.push(target(descriptor)?.to_string());
            args.push(scope_flag(descriptor).to_string());
        }
        CommandKind::Search => {
            args.push("--json".to_string());
            args.extend(descriptor.search_text().map(str::to_string));
        }
        CommandKind::Update => {
            args.extend(descriptor.packages().iter().cloned());
        }
    }

    Ok(args)
}

fn target(descriptor: &CommandDescriptor) -> Result<&str> {
    descriptor.package().ok_or_else(|| {
        Error::InvalidArgument(format!("{} requires a package name", descriptor.kind()))
    })
}

fn scope_flag(descriptor: &CommandDescriptor) -> &'static str {
    if descriptor.is_global() {
        "-g"
    } else {
        save_flag(descriptor.dependency_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npmx_core::{Package, ToolContext};
    use std::path::PathBuf;

    fn context() -> ToolContext {
        ToolContext {
            working_dir: PathBuf::from("."),
            tool_path: None,
            use_fallback: true,
        }
    }

    fn args(descriptor: CommandDescriptor) -> Vec<String> {
        build_arguments(&descriptor).unwrap()
    }

    #[test]
    fn test_install_arguments() {
        let cmd = CommandDescriptor::install(
            "lodash",
            Some("^4.0.0"),
            DependencyType::Standard,
            false,
            context(),
        )
        .unwrap();
        assert_eq!(args(cmd), ["install", "lodash@^4.0.0", "--save"]);

        let cmd = CommandDescriptor::install(
            "mocha",
            None,
            DependencyType::Development,
            false,
            context(),
        )
        .unwrap();
        assert_eq!(args(cmd), ["install", "mocha", "--save-dev"]);

        let cmd = CommandDescriptor::install(
            "fsevents",
            None,
            DependencyType::Optional,
            false,
            context(),
        )
        .unwrap();
        assert_eq!(args(cmd), ["install", "fsevents", "--save-optional"]);
    }

    #[test]
    fn test_global_ignores_dependency_type() {
        let cmd = CommandDescriptor::install(
            "typescript",
            Some("5.x"),
            DependencyType::Development,
            true,
            context(),
        )
        .unwrap();
        assert_eq!(args(cmd), ["install", "typescript@5.x", "-g"]);

        let cmd =
            CommandDescriptor::uninstall("typescript", DependencyType::Standard, true, context())
                .unwrap();
        assert_eq!(args(cmd), ["uninstall", "typescript", "-g"]);
    }

    #[test]
    fn test_uninstall_arguments() {
        let cmd =
            CommandDescriptor::uninstall("mocha", DependencyType::Development, false, context())
                .unwrap();
        assert_eq!(args(cmd), ["uninstall", "mocha", "--save-dev"]);
    }

    #[test]
    fn test_search_arguments() {
        let cmd = CommandDescriptor::search(" react hooks ", context()).unwrap();
        assert_eq!(args(cmd), ["search", "--json", "react hooks"]);
    }

    #[test]
    fn test_update_arguments() {
        let cmd = CommandDescriptor::update(&[], context()).unwrap();
        assert_eq!(args(cmd), ["update"]);

        let packages = vec![
            Package::new("react", "18.2.0", ""),
            Package::new("vue", "3.4.0", ""),
        ];
        assert_eq!(
            args(CommandDescriptor::update(&packages, context()).unwrap()),
            ["update", "react", "vue"]
        );
    }

    #[test]
    fn test_target_requires_package() {
        let search = CommandDescriptor::search("react", context()).unwrap();
        assert!(matches!(target(&search), Err(Error::InvalidArgument(_))));

        let install =
            CommandDescriptor::install("react", None, DependencyType::Standard, false, context())
                .unwrap();
        assert_eq!(target(&install).unwrap(), "react");
    }
}
