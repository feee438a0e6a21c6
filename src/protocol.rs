//! The line-oriented wire protocol's request parser.
//!
//! One action per non-blank line, `<tag>:<payload>`. `u`/`U` and `f`/`F`
//! lines update a rolling context; `d`/`D`/`r`/`R`/`n`/`N` lines each
//! produce one [`Action`] bound to that context.
//!
//! The numeric field on an `f`/`F` line becomes the action's
//! `server_version`; the numeric field on the following `d`/`D`/`r`/`R`
//! line becomes the action's `client_version`. This crossed naming is
//! inherited from the wire format's history — see SPEC_FULL.md §4.1 and
//! the worked example below, which is the ground truth this parser is
//! tested against.

/// What a non-context action line does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Delta,
    Raw,
    Null,
}

/// One parsed action line, bound to the context in effect when it
/// appeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub user: String,
    pub filename: String,
    pub mode: Mode,
    pub data: String,
    pub force: bool,
    /// Absent for `null` actions.
    pub client_version: Option<u64>,
    /// Absent for `null` actions.
    pub server_version: Option<u64>,
    pub echo_user: bool,
}

#[derive(Default)]
struct Context {
    user: Option<String>,
    echo_user: bool,
    filename: Option<String>,
    force: bool,
    version: Option<u64>,
}

/// Parse a request body into an ordered list of actions. Malformed lines
/// (bad tag, bad version, missing context) are logged and skipped; they
/// never abort parsing of the rest of the body.
pub fn parse_request(text: &str) -> Vec<Action> {
    let mut actions = Vec::new();
    let mut ctx = Context::default();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let Some((tag, payload)) = line.split_once(':') else {
            tracing::warn!(line, "skipping line with no ':' separator");
            continue;
        };

        match tag {
            "u" => {
                ctx.user = Some(payload.to_string());
                ctx.echo_user = false;
            }
            "U" => {
                ctx.user = Some(payload.to_string());
                ctx.echo_user = true;
            }
            "f" | "F" => match split_version(payload) {
                Some((version, name)) => {
                    ctx.force = tag == "F";
                    ctx.version = Some(version);
                    ctx.filename = Some(name.to_string());
                }
                None => tracing::warn!(line, "skipping malformed f/F line"),
            },
            "n" | "N" => {
                let Some(user) = ctx.user.clone() else {
                    tracing::warn!(line, "skipping n/N line with no user set");
                    continue;
                };
                actions.push(Action {
                    user,
                    filename: payload.to_string(),
                    mode: Mode::Null,
                    data: String::new(),
                    force: false,
                    client_version: None,
                    server_version: None,
                    echo_user: ctx.echo_user,
                });
            }
            "d" | "D" | "r" | "R" => {
                let (Some(user), Some(filename), Some(server_version)) =
                    (ctx.user.clone(), ctx.filename.clone(), ctx.version)
                else {
                    tracing::warn!(line, "skipping d/D/r/R line with no filename context");
                    continue;
                };
                let Some((client_version, data)) = split_version(payload) else {
                    tracing::warn!(line, "skipping malformed d/D/r/R line");
                    continue;
                };
                let tag_force = tag == "D" || tag == "R";
                actions.push(Action {
                    user,
                    filename,
                    mode: if tag == "d" || tag == "D" {
                        Mode::Delta
                    } else {
                        Mode::Raw
                    },
                    data: data.to_string(),
                    force: ctx.force || tag_force,
                    client_version: Some(client_version),
                    server_version: Some(server_version),
                    echo_user: ctx.echo_user,
                });
            }
            _ => tracing::warn!(line, "skipping line with unrecognized tag"),
        }
    }

    actions
}

/// Split a `<N>:<rest>` payload into its numeric prefix and remainder.
fn split_version(payload: &str) -> Option<(u64, &str)> {
    let (num, rest) = payload.split_once(':')?;
    num.parse().ok().map(|n| (n, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_actions() {
        assert_eq!(parse_request(""), Vec::new());
    }

    #[test]
    fn delta_action_worked_example() {
        let actions = parse_request("u:fred\nf:3:report\nd:2:=10+Hello-7=2\n\n");
        assert_eq!(
            actions,
            vec![Action {
                user: "fred".to_string(),
                filename: "report".to_string(),
                mode: Mode::Delta,
                data: "=10+Hello-7=2".to_string(),
                force: false,
                server_version: Some(3),
                client_version: Some(2),
                echo_user: false,
            }]
        );
    }

    #[test]
    fn raw_force_worked_example() {
        let actions = parse_request("U:fred\nf:3:report\nR:2:Hello World\n\n");
        assert_eq!(
            actions,
            vec![Action {
                user: "fred".to_string(),
                filename: "report".to_string(),
                mode: Mode::Raw,
                data: "Hello World".to_string(),
                force: true,
                server_version: Some(3),
                client_version: Some(2),
                echo_user: true,
            }]
        );
    }

    #[test]
    fn null_action_worked_example() {
        let actions = parse_request("U:fred\nN:report\n\n");
        assert_eq!(
            actions,
            vec![Action {
                user: "fred".to_string(),
                filename: "report".to_string(),
                mode: Mode::Null,
                data: String::new(),
                force: false,
                server_version: None,
                client_version: None,
                echo_user: true,
            }]
        );
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let actions = parse_request("u:fred\nf:3:report\nbogus line\nd:2:=1+x-1=0\n\n");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].data, "=1+x-1=0");
    }
}
