use anyhow::{bail, Context, Result};

use workitems::{
    CommitOutcome, Expand, RelationType, WorkItem, WorkItemClient, WorkItemService,
};

#[derive(Debug, PartialEq)]
pub enum Command {
    Get {
        ids: Vec<i32>,
        fields: Option<Vec<String>>,
        expand: Expand,
    },
    Set {
        id: i32,
        fields: Vec<(String, String)>,
    },
    Create {
        type_name: String,
        fields: Vec<(String, String)>,
    },
    Link {
        id: i32,
        target: i32,
        relation_type_name: String,
    },
    Unlink {
        id: i32,
        target: i32,
        verify: bool,
    },
    Help,
}

/// Parse everything after the program name.
///
/// Supported forms:
///   workitems get 1,2,3 [-f System.Title,System.State] [-e relations]
///   workitems set 42 System.Title="New title" System.State=Active
///   workitems create Task System.Title="Write docs"
///   workitems link 42 43 child
///   workitems unlink 42 43 [--verify]
pub fn parse_command(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };
    match name.as_str() {
        "get" => parse_get(rest),
        "set" => {
            let (id, assignments) = split_id(rest, "set <id> Field=Value...")?;
            Ok(Command::Set {
                id,
                fields: parse_assignments(assignments)?,
            })
        }
        "create" => {
            let Some((type_name, assignments)) = rest.split_first() else {
                bail!("Usage: workitems create <type> Field=Value...");
            };
            Ok(Command::Create {
                type_name: type_name.clone(),
                fields: parse_assignments(assignments)?,
            })
        }
        "link" => match rest {
            [id, target, kind] => Ok(Command::Link {
                id: parse_id(id)?,
                target: parse_id(target)?,
                relation_type_name: relation_type_name(kind)?,
            }),
            _ => bail!("Usage: workitems link <id> <target> <kind>"),
        },
        "unlink" => {
            let verify = rest.iter().any(|a| a == "--verify");
            let positional: Vec<&String> = rest.iter().filter(|a| *a != "--verify").collect();
            match positional.as_slice() {
                [id, target] => Ok(Command::Unlink {
                    id: parse_id(id)?,
                    target: parse_id(target)?,
                    verify,
                }),
                _ => bail!("Usage: workitems unlink <id> <target> [--verify]"),
            }
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("Unknown command {other:?}. Run `workitems help` for usage."),
    }
}

fn parse_get(args: &[String]) -> Result<Command> {
    let mut ids = Vec::new();
    let mut fields = None;
    let mut expand = Expand::All;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-f" | "--fields" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("Missing value for -f/--fields flag");
                };
                fields = Some(split_list(value));
            }
            "-e" | "--expand" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("Missing value for -e/--expand flag");
                };
                expand = value.parse()?;
            }
            other => {
                for id in split_list(other) {
                    ids.push(parse_id(&id)?);
                }
            }
        }
        i += 1;
    }

    if ids.is_empty() {
        bail!("Usage: workitems get <ids> [-f fields] [-e expand]");
    }
    Ok(Command::Get { ids, fields, expand })
}

fn split_id<'a>(args: &'a [String], usage: &str) -> Result<(i32, &'a [String])> {
    let Some((id, rest)) = args.split_first() else {
        bail!("Usage: workitems {usage}");
    };
    Ok((parse_id(id)?, rest))
}

fn parse_id(value: &str) -> Result<i32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid work item id {value:?}"))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_assignments(args: &[String]) -> Result<Vec<(String, String)>> {
    if args.is_empty() {
        bail!("Expected at least one Field=Value pair");
    }
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => bail!("Expected Field=Value, got {arg:?}"),
        })
        .collect()
}

/// Accept a short kind (`child`) or a full wire name (`System.LinkTypes.Related`).
fn relation_type_name(kind: &str) -> Result<String> {
    if let Some(name) = RelationType::parse_short(kind).wire_name() {
        return Ok(name.to_string());
    }
    if kind.contains('.') {
        return Ok(kind.to_string());
    }
    let known: Vec<&str> = RelationType::KNOWN.iter().map(|k| k.as_str()).collect();
    bail!("Unknown relation kind {kind:?}; expected one of {}", known.join(", "))
}

pub async fn run(client: &WorkItemClient, command: Command, batch_size: usize) -> Result<()> {
    match command {
        Command::Help => print_help(),
        Command::Get {
            ids,
            fields,
            expand,
        } => {
            let items = client
                .get_work_items(&ids, fields.as_deref(), expand, batch_size)
                .await?;
            if items.is_empty() {
                println!("No work items found.");
            }
            for item in &items {
                print_item(item);
            }
        }
        Command::Set { id, fields } => {
            let mut item = fetch(client, id).await?;
            for (name, value) in fields {
                item.set(name, value);
            }
            match item.update_fields().await? {
                CommitOutcome::Success => println!("Updated #{id} (rev {})", rev(&item)),
                CommitOutcome::Empty => println!("Nothing to update on #{id}"),
                CommitOutcome::Failure => bail!("Server rejected the update of #{id}"),
            }
        }
        Command::Create { type_name, fields } => {
            let item = client
                .create_work_item(&type_name, fields_ref(&fields), &[], &Default::default())
                .await?;
            match item {
                Some(item) => {
                    println!("Created #{}", item.id());
                    print_item(&item);
                }
                None => bail!("Server rejected the new {type_name}"),
            }
        }
        Command::Link {
            id,
            target,
            relation_type_name,
        } => {
            let mut item = fetch(client, id).await?;
            match item.add_relation_named(target, &relation_type_name, None).await? {
                CommitOutcome::Failure => bail!("Server rejected the link #{id} -> #{target}"),
                _ => println!("Linked #{id} -> #{target} ({relation_type_name})"),
            }
        }
        Command::Unlink { id, target, verify } => {
            let mut item = fetch(client, id).await?;
            let outcome = if verify {
                item.remove_relation_verified(target).await?
            } else {
                item.remove_relation(target).await?
            };
            match outcome {
                CommitOutcome::Failure => bail!("Server rejected removing #{id} -> #{target}"),
                _ => println!("Unlinked #{id} -> #{target}"),
            }
        }
    }
    Ok(())
}

fn fields_ref(fields: &[(String, String)]) -> Vec<(&str, &str)> {
    fields
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect()
}

async fn fetch(client: &WorkItemClient, id: i32) -> Result<WorkItem> {
    client
        .get_single_work_item(id, None, Expand::All)
        .await?
        .with_context(|| format!("Work item #{id} not found"))
}

fn rev(item: &WorkItem) -> String {
    item.rev().map_or_else(|| "?".to_string(), |r| r.to_string())
}

fn print_item(item: &WorkItem) {
    println!(
        "#{} [{}] rev {}",
        item.id(),
        item.item_type_name().unwrap_or("?"),
        rev(item)
    );
    for name in item.field_names() {
        if let Some(value) = item.get(name) {
            println!("  {name}: {value}");
        }
    }
    for link in item.relations() {
        let target = link
            .target_id()
            .map_or_else(|| link.url.clone(), |id| format!("#{id}"));
        println!("  -> {} {target}", link.relation_type_name);
    }
}

pub fn print_help() {
    println!("workitems - read and edit work items from the command line\n");
    println!("USAGE:");
    println!("  workitems get <ids> [-f fields] [-e expand]   Print work items");
    println!("  workitems set <id> Field=Value...             Update fields");
    println!("  workitems create <type> Field=Value...        Create a work item");
    println!("  workitems link <id> <target> <kind>           Add a relation");
    println!("  workitems unlink <id> <target> [--verify]     Remove a relation");
    println!();
    println!("KINDS:");
    println!("  parent, child, affects, affected-by, related, or a full relation name");
    println!();
    println!("CONFIG:");
    println!("  ~/.workitems/config.toml with a [server] table (server_url, project,");
    println!("  personal_access_token, api_version, batch_size, timeout_secs)");
    println!();
    println!("Set RUST_LOG=debug to trace requests.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_is_help() {
        assert_eq!(parse_command(&args(&[])).unwrap(), Command::Help);
        assert_eq!(parse_command(&args(&["--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn get_accepts_lists_and_separate_ids() {
        let command = parse_command(&args(&["get", "1,2", "3"])).unwrap();
        assert_eq!(
            command,
            Command::Get {
                ids: vec![1, 2, 3],
                fields: None,
                expand: Expand::All,
            }
        );
    }

    #[test]
    fn get_with_fields_and_expand() {
        let command = parse_command(&args(&[
            "get",
            "7",
            "-f",
            "System.Title, System.State",
            "--expand",
            "relations",
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Get {
                ids: vec![7],
                fields: Some(vec!["System.Title".into(), "System.State".into()]),
                expand: Expand::Relations,
            }
        );
    }

    #[test]
    fn get_without_ids_fails() {
        assert!(parse_command(&args(&["get", "-f", "System.Title"])).is_err());
        assert!(parse_command(&args(&["get", "abc"])).is_err());
    }

    #[test]
    fn set_keeps_equals_in_value() {
        let command =
            parse_command(&args(&["set", "42", "System.Title=a=b", "System.State=Active"])).unwrap();
        assert_eq!(
            command,
            Command::Set {
                id: 42,
                fields: vec![
                    ("System.Title".into(), "a=b".into()),
                    ("System.State".into(), "Active".into()),
                ],
            }
        );
    }

    #[test]
    fn set_rejects_missing_assignments() {
        assert!(parse_command(&args(&["set", "42"])).is_err());
        let err = parse_command(&args(&["set", "42", "Title"])).unwrap_err();
        assert!(err.to_string().contains("Field=Value"));
    }

    #[test]
    fn create_takes_type_and_fields() {
        let command = parse_command(&args(&["create", "Bug", "System.Title=Crash"])).unwrap();
        assert_eq!(
            command,
            Command::Create {
                type_name: "Bug".into(),
                fields: vec![("System.Title".into(), "Crash".into())],
            }
        );
    }

    #[test]
    fn link_resolves_short_and_full_kinds() {
        let short = parse_command(&args(&["link", "1", "2", "affected-by"])).unwrap();
        assert_eq!(
            short,
            Command::Link {
                id: 1,
                target: 2,
                relation_type_name: "Microsoft.VSTS.Common.Affects-Reverse".into(),
            }
        );

        let full = parse_command(&args(&["link", "1", "2", "System.LinkTypes.Dependency"])).unwrap();
        assert!(matches!(full, Command::Link { relation_type_name, .. } if relation_type_name == "System.LinkTypes.Dependency"));
    }

    #[test]
    fn link_rejects_unknown_kind() {
        let err = parse_command(&args(&["link", "1", "2", "sibling"])).unwrap_err();
        assert!(err.to_string().contains("parent"));
    }

    #[test]
    fn unlink_with_verify_flag() {
        let command = parse_command(&args(&["unlink", "--verify", "1", "2"])).unwrap();
        assert_eq!(
            command,
            Command::Unlink {
                id: 1,
                target: 2,
                verify: true,
            }
        );
    }

    #[test]
    fn unknown_command_fails() {
        let err = parse_command(&args(&["delete", "1"])).unwrap_err();
        assert!(err.to_string().contains("Unknown command"));
    }
}
