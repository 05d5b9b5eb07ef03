//! Makefile hook: turn a `.vcxproj` into an NMake wrapper around ninja.
//!
//! After the rewrite the IDE still lists the project, but building it runs
//! the generated `build.ninja` for the matching artifact.  Custom build
//! steps and project references are removed since ninja now owns both.

use std::sync::LazyLock;

use regex::Regex;

use crate::extract::Removals;
use crate::project::ParsedConfig;
use crate::scanner::{apply_removals, escape_xml};

static CONFIGURATION_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<ConfigurationType>\s*\w+\s*</ConfigurationType>").expect("invalid configuration type regex")
});

const PROPERTY_GROUP_END: &str = "</PropertyGroup>";
const PROJECT_END: &str = "</Project>";

/// NMake property group of one configuration.
fn nmake_group(config: &ParsedConfig, ninja: &str, root: &str) -> String {
    let ninja = format!("\"{ninja}\" -C \"{root}\"");
    let target = config.output_path();
    let build = escape_xml(&format!("{ninja} {target}"));
    let rebuild = escape_xml(&format!("{ninja} -t clean && {ninja} {target}"));
    let clean = escape_xml(&format!("{ninja} -t clean"));

    let mut group = format!(
        "\n  <PropertyGroup Condition=\"'$(Configuration)|$(Platform)'=='{}|{}'\">\n",
        config.name, config.platform
    );
    group.push_str(&format!("    <NMakeBuildCommandLine>{build}</NMakeBuildCommandLine>\n"));
    group.push_str(&format!("    <NMakeReBuildCommandLine>{rebuild}</NMakeReBuildCommandLine>\n"));
    group.push_str(&format!("    <NMakeCleanCommandLine>{clean}</NMakeCleanCommandLine>\n"));
    group.push_str(&format!(
        "    <NMakePreprocessorDefinitions>{}</NMakePreprocessorDefinitions>\n",
        escape_xml(&config.defines.join(";"))
    ));
    group.push_str(&format!(
        "    <NMakeIncludeSearchPath>{}</NMakeIncludeSearchPath>\n",
        escape_xml(&config.includes.join(";"))
    ));
    group.push_str("  </PropertyGroup>");
    group
}

/// Rewritten project text.
///
/// `removals` must come from extracting this very `text`.  The NMake groups
/// go after the last `</PropertyGroup>`, or before `</Project>` when the
/// file has none.
pub fn rewrite_project(
    text: &str,
    removals: &Removals,
    configs: &[ParsedConfig],
    ninja: &str,
    root: &str,
) -> String {
    let mut out = text.to_string();
    apply_removals(&mut out, removals.all());

    let mut out = CONFIGURATION_TYPE
        .replace_all(&out, "<ConfigurationType>Makefile</ConfigurationType>")
        .into_owned();

    let groups: String = configs.iter().map(|c| nmake_group(c, ninja, root)).collect();
    let at = match (out.rfind(PROPERTY_GROUP_END), out.rfind(PROJECT_END)) {
        (Some(pos), _) => pos + PROPERTY_GROUP_END.len(),
        (None, Some(pos)) => pos,
        (None, None) => out.len(),
    };
    out.insert_str(at, &groups);
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::extract::{DefaultInputs, extract};
    use crate::project::Project;

    const PROJECT: &str = r#"<Project DefaultTargets="Build">
  <PropertyGroup Label="Configuration">
    <ConfigurationType>StaticLibrary</ConfigurationType>
  </PropertyGroup>
  <ItemGroup>
    <ClCompile Include="a.cpp" />
    <CustomBuild Include="gen.txt">
      <Message Condition="'$(Configuration)|$(Platform)'=='Release|x64'">gen</Message>
      <Command Condition="'$(Configuration)|$(Platform)'=='Release|x64'">gen.exe</Command>
      <Outputs Condition="'$(Configuration)|$(Platform)'=='Release|x64'">gen.h</Outputs>
    </CustomBuild>
  </ItemGroup>
  <ItemGroup>
    <ProjectReference Include="core.vcxproj">
      <Project>{11111111-2222-3333-4444-555555555555}</Project>
    </ProjectReference>
  </ItemGroup>
</Project>
"#;

    fn release() -> ParsedConfig {
        ParsedConfig {
            name: "Release".into(),
            platform: "x64".into(),
            target_name: "lib".into(),
            output_dir: "Release/".into(),
            target_ext: ".lib".into(),
            defines: vec!["NDEBUG".into(), "A=1".into()],
            includes: vec!["include".into()],
            ..Default::default()
        }
    }

    fn rewritten() -> String {
        let mut project = Project::new("X", "lib", "lib.vcxproj");
        let removals =
            extract(&mut project, Path::new("lib.vcxproj"), PROJECT, PROJECT, &DefaultInputs::new()).unwrap();
        rewrite_project(PROJECT, &removals, &[release()], "C:/bin/ninja.exe", "C:/ws")
    }

    #[test]
    fn configuration_type_becomes_makefile() {
        let text = rewritten();
        assert!(text.contains("<ConfigurationType>Makefile</ConfigurationType>"));
        assert!(!text.contains("StaticLibrary"));
    }

    #[test]
    fn custom_build_and_references_removed() {
        let text = rewritten();
        assert!(!text.contains("<CustomBuild"));
        assert!(!text.contains("<ProjectReference"));
        assert!(text.contains("<ClCompile Include=\"a.cpp\" />"));
    }

    #[test]
    fn nmake_group_follows_last_property_group() {
        let text = rewritten();
        let group = text.find("<PropertyGroup Condition=\"'$(Configuration)|$(Platform)'=='Release|x64'\">").unwrap();
        assert!(group > text.find("</PropertyGroup>").unwrap());
        assert!(text.contains(
            "<NMakeBuildCommandLine>&quot;C:/bin/ninja.exe&quot; -C &quot;C:/ws&quot; Release/lib.lib</NMakeBuildCommandLine>"
        ));
        assert!(text.contains("-t clean &amp;&amp; &quot;C:/bin/ninja.exe&quot;"));
        assert!(text.contains("<NMakePreprocessorDefinitions>NDEBUG;A=1</NMakePreprocessorDefinitions>"));
        assert!(text.contains("<NMakeIncludeSearchPath>include</NMakeIncludeSearchPath>"));
    }

    #[test]
    fn without_property_group_inserts_before_project_end() {
        let text = rewrite_project("<Project>\n</Project>", &Removals::default(), &[release()], "ninja", "C:/ws");
        assert!(text.starts_with("<Project>\n\n  <PropertyGroup"));
        assert!(text.ends_with("</PropertyGroup></Project>"));
    }
}
