use crate::db;
use crate::error::Result;
use crate::ipc::error::{err, fail, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{SchedulePolicy, Semesters, SessionWindow};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

#[derive(Clone, Copy)]
enum SetupSection {
    Schedule,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Schedule => "setup.schedule",
        }
    }
}

fn default_section(section: SetupSection) -> Result<Value> {
    match section {
        SetupSection::Schedule => Ok(serde_json::to_value(SchedulePolicy::default())?),
    }
}

/// Merges `patch` into `current` only if the merged section is valid as a
/// whole; `current` is untouched on error.
fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> std::result::Result<(), String> {
    let mut next = current.clone();
    let obj = next
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Schedule => match k.as_str() {
                "windows" => {
                    let windows: Vec<SessionWindow> = serde_json::from_value(v.clone())
                        .map_err(|e| format!("windows: {}", e))?;
                    obj.insert(k.clone(), json!(windows));
                }
                "semesters" => {
                    let semesters: Semesters = serde_json::from_value(v.clone())
                        .map_err(|e| format!("semesters: {}", e))?;
                    obj.insert(k.clone(), json!(semesters));
                }
                _ => return Err(format!("unknown schedule field: {}", k)),
            },
        }
    }
    match section {
        SetupSection::Schedule => {
            let policy: SchedulePolicy =
                serde_json::from_value(next.clone()).map_err(|e| e.to_string())?;
            policy.validate()?;
        }
    }
    *current = next;
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> Result<Value> {
    let mut current = default_section(section)?;
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values fall back to defaults.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                warn!(key = section.key(), error = %msg, "ignoring persisted setup section");
            }
        }
    }
    Ok(current)
}

/// Effective grid windows and semester calendar for the open workspace.
pub fn load_schedule_policy(conn: &rusqlite::Connection) -> Result<SchedulePolicy> {
    let section = load_section(conn, SetupSection::Schedule)?;
    Ok(serde_json::from_value(section)?)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let schedule = match load_section(conn, SetupSection::Schedule) {
        Ok(v) => v,
        Err(e) => return fail(&req.id, &e),
    };
    ok(&req.id, json!({ "schedule": schedule }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return fail(&req.id, &e),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(key = section.key(), "setup section updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
