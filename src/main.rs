use cf_frames::jvm::class_graph::{ClassData, ClassGraph};
use cf_frames::jvm::verifier::{is_frame_assignable, AssignabilityResult, Frame, FrameType};
use cf_frames::jvm::{BinaryName, ClassAccessFlags, Error, Name};

use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use std::collections::BTreeMap;
use std::process;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("Frame assignability checker")
        .version(crate_version!())
        .about("Checks whether one JVM stack map frame is assignable to another")
        .after_help(
            "Frame types are written as `int`, `J`, `Ljava/lang/String;`, `[I`, `null`, `top`, \
             `top2`, `uninitializedThis`, or `new#3:Lfoo/Bar;`. Locals are written as \
             `0=int,2=J` and stacks are written top first, as `int,Ljava/lang/String;`.",
        )
        .arg(
            Arg::new("source locals")
                .long("source-locals")
                .value_name("LOCALS")
                .help("Local variables of the frame being checked"),
        )
        .arg(
            Arg::new("source stack")
                .long("source-stack")
                .value_name("STACK")
                .help("Stack of the frame being checked"),
        )
        .arg(
            Arg::new("target locals")
                .long("target-locals")
                .value_name("LOCALS")
                .help("Local variables of the expected frame"),
        )
        .arg(
            Arg::new("target stack")
                .long("target-stack")
                .value_name("STACK")
                .help("Stack of the expected frame"),
        )
        .arg(
            Arg::new("class")
                .long("class")
                .value_name("CLASS:SUPERCLASS[:INTERFACE...]")
                .action(ArgAction::Append)
                .help("Adds a class to the hierarchy (on top of the Java library classes)"),
        )
        .arg(
            Arg::new("interface")
                .long("interface")
                .value_name("INTERFACE[:SUPERINTERFACE...]")
                .action(ArgAction::Append)
                .help("Adds an interface to the hierarchy"),
        )
        .get_matches();

    let class_graph = ClassGraph::new();
    class_graph.insert_java_library_types();
    if let Some(classes) = matches.get_many::<String>("class") {
        for class in classes {
            class_graph.add_class(parse_class(class, false)?);
        }
    }
    if let Some(interfaces) = matches.get_many::<String>("interface") {
        for interface in interfaces {
            class_graph.add_class(parse_class(interface, true)?);
        }
    }

    let source = Frame::new(
        parse_locals(string_arg(&matches, "source locals"))?,
        parse_stack(string_arg(&matches, "source stack"))?,
    );
    let target = Frame::new(
        parse_locals(string_arg(&matches, "target locals"))?,
        parse_stack(string_arg(&matches, "target stack"))?,
    );
    log::info!("Checking [{}] against [{}]", source, target);

    match is_frame_assignable(&source, &target, &class_graph) {
        AssignabilityResult::Successful => {
            println!("Successful");
            Ok(())
        }
        AssignabilityResult::Failed(failed) => {
            println!("Failed: {}", failed);
            process::exit(1)
        }
    }
}

/// Missing arguments are empty
fn string_arg<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches.get_one::<String>(name).map_or("", String::as_str)
}

/// Parse `0=int,2=J`
fn parse_locals(locals: &str) -> Result<BTreeMap<u16, FrameType>, Error> {
    let mut parsed = BTreeMap::new();
    for entry in locals.split(',').filter(|entry| !entry.trim().is_empty()) {
        let (index, frame_type) = entry.split_once('=').ok_or_else(|| {
            Error::MalformedFrameType(format!("Expected `INDEX=TYPE` but found '{}'", entry))
        })?;
        let index = index.trim().parse::<u16>().map_err(|err| {
            Error::MalformedFrameType(format!("Invalid local index in '{}': {}", entry, err))
        })?;
        let frame_type = frame_type
            .trim()
            .parse::<FrameType>()
            .map_err(Error::MalformedFrameType)?;
        parsed.insert(index, frame_type);
    }
    Ok(parsed)
}

/// Parse a stack written top first
fn parse_stack(stack: &str) -> Result<Vec<FrameType>, Error> {
    let mut parsed = stack
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            entry
                .trim()
                .parse::<FrameType>()
                .map_err(Error::MalformedFrameType)
        })
        .collect::<Result<Vec<FrameType>, Error>>()?;
    parsed.reverse();
    Ok(parsed)
}

/// Parse `foo/Bar:foo/Super:foo/Interface1:foo/Interface2`
fn parse_class(class: &str, is_interface: bool) -> Result<ClassData, Error> {
    let mut names = class
        .split(':')
        .map(|name| BinaryName::from_str(name.trim()).map_err(Error::MalformedName));
    let name = names
        .next()
        .unwrap_or_else(|| Err(Error::MalformedName(String::from("Missing class name"))))?;

    let class_data = if is_interface {
        let mut class_data = ClassData::new(
            name,
            BinaryName::OBJECT,
            ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        );
        for interface in names {
            class_data = class_data.implementing(interface?);
        }
        class_data
    } else {
        let superclass = names.next().unwrap_or(Ok(BinaryName::OBJECT))?;
        let mut class_data = ClassData::new(name, superclass, ClassAccessFlags::PUBLIC);
        for interface in names {
            class_data = class_data.implementing(interface?);
        }
        class_data
    };
    Ok(class_data)
}
