// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("apkget")
        .version(env!("CARGO_PKG_VERSION"))
        .author("apkget Contributors")
        .about("A simple package manager for Android APKs")
        .subcommand_required(false)
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .env("APKGET_ROOT")
                .default_value("app")
                .global(true)
                .help("Local root directory"),
        )
        .arg(
            Arg::new("repo")
                .long("repo")
                .value_name("URL")
                .env("APKGET_REPO")
                .global(true)
                .help("Remote index URL (a URL ending in '/' gets index.json appended)"),
        )
        .arg(
            Arg::new("abi")
                .long("abi")
                .value_name("ABI")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .global(true)
                .help("Native ABIs to keep on install (default: all known ABIs)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .default_value("600")
                .global(true)
                .help("Transport timeout in seconds"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .subcommand(Command::new("update").about("Update the index from the remote repository"))
        .subcommand(
            Command::new("search")
                .about("Search packages by regular expression")
                .arg(
                    Arg::new("pattern")
                        .default_value(".")
                        .help("Case-insensitive pattern matched against name, title and path"),
                )
                .arg(
                    Arg::new("name_only")
                        .short('n')
                        .long("name-only")
                        .action(ArgAction::SetTrue)
                        .help("Match the package name only"),
                )
                .arg(
                    Arg::new("latest")
                        .short('l')
                        .long("latest")
                        .action(ArgAction::SetTrue)
                        .help("Show only the latest version of each package"),
                )
                .arg(
                    Arg::new("installed")
                        .short('i')
                        .long("installed")
                        .action(ArgAction::SetTrue)
                        .help("Show only installed packages"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show the index entry of a package")
                .arg(Arg::new("name").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("fetch")
                .about("Download packages into the cache")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                )
                .arg(
                    Arg::new("reinstall")
                        .long("reinstall")
                        .action(ArgAction::SetTrue)
                        .help("Replace an existing installation"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Uninstall packages")
                .arg(
                    Arg::new("names")
                        .num_args(1..)
                        .required_unless_present("all")
                        .help("Package names"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Succeed even if a package is not installed"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("names")
                        .help("Uninstall every installed package"),
                ),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(Command::new("clean").about("Remove all cached packages, keeping the index"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"]),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("apkget.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
