//! Spoken replies
//!
//! Turns an [`Outcome`] into the short sentence handed to the voice output.

use voxshell_core::{DeclineCause, IntentId, ReplyLanguage};
use voxshell_sandbox::ExecutionResult;

use crate::session::{Outcome, Refusal};

/// Longest stdout excerpt spoken back to the user
const SPOKEN_OUTPUT_CHARS: usize = 200;

/// Human label of an intent
pub fn intent_label(intent: IntentId, language: ReplyLanguage) -> &'static str {
    match language {
        ReplyLanguage::Zh => match intent {
            IntentId::CreateFolder => "建立資料夾",
            IntentId::ListFiles => "列出檔案",
            IntentId::ChangeDirectory => "切換目錄",
            IntentId::CopyFile => "複製檔案",
            IntentId::MoveFile => "移動檔案",
            IntentId::DeleteFile => "刪除檔案",
            IntentId::RemoveFolder => "刪除資料夾",
            IntentId::PurgeDirectory => "強制刪除目錄",
            IntentId::CurrentDirectory => "顯示目前目錄",
            IntentId::DiskUsage => "查看磁碟空間",
            IntentId::SystemInfo => "查看系統資訊",
            IntentId::CurrentTime => "查看時間",
        },
        ReplyLanguage::En => match intent {
            IntentId::CreateFolder => "create folder",
            IntentId::ListFiles => "list files",
            IntentId::ChangeDirectory => "change directory",
            IntentId::CopyFile => "copy file",
            IntentId::MoveFile => "move file",
            IntentId::DeleteFile => "delete file",
            IntentId::RemoveFolder => "remove folder",
            IntentId::PurgeDirectory => "purge directory",
            IntentId::CurrentDirectory => "show current directory",
            IntentId::DiskUsage => "show disk usage",
            IntentId::SystemInfo => "show system info",
            IntentId::CurrentTime => "show the time",
        },
    }
}

/// Render the reply for one turn
pub fn render(outcome: &Outcome, language: ReplyLanguage) -> String {
    match language {
        ReplyLanguage::Zh => render_zh(outcome),
        ReplyLanguage::En => render_en(outcome),
    }
}

fn render_zh(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Silence => "我沒有聽清楚，請再說一次".to_string(),
        Outcome::NotUnderstood => "我不知道如何執行這個指令".to_string(),
        Outcome::MissingSlot { intent, slot } => {
            format!("要{}，請告訴我{}", intent_label(*intent, ReplyLanguage::Zh), slot_label_zh(slot))
        }
        Outcome::Unsupported { intent, os } => {
            format!("這台電腦（{}）不支援「{}」", os, intent_label(*intent, ReplyLanguage::Zh))
        }
        Outcome::Refused { .. } => "這個指令可能不安全，我無法執行".to_string(),
        Outcome::AwaitingConfirmation { command, .. } => {
            format!("即將執行「{}」，請說「確認」繼續，或說「取消」", command)
        }
        Outcome::Declined { intent, cause } => {
            let label = intent_label(*intent, ReplyLanguage::Zh);
            match cause {
                DeclineCause::TimedOut => format!("等待確認逾時，已取消{}", label),
                DeclineCause::Cancelled | DeclineCause::Declined => format!("好的，不{}", label),
                DeclineCause::Superseded => format!("已放棄先前的{}", label),
            }
        }
        Outcome::Executed { result, .. } => executed_zh(result),
        Outcome::DirectoryChanged { path } => format!("指令執行成功。目前目錄：{}", path.display()),
        Outcome::DirectoryChangeFailed { path } => {
            format!("指令執行失敗: 找不到目錄 {}", path.display())
        }
        Outcome::DryRun { command, .. } => format!("模擬模式，不會執行：{}", command),
    }
}

fn render_en(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Silence => "I didn't catch that, please say it again".to_string(),
        Outcome::NotUnderstood => "I don't know how to do that".to_string(),
        Outcome::MissingSlot { intent, slot } => {
            format!("To {}, tell me the {}", intent_label(*intent, ReplyLanguage::En), slot)
        }
        Outcome::Unsupported { intent, os } => {
            format!("Can't {} on {}", intent_label(*intent, ReplyLanguage::En), os)
        }
        Outcome::Refused { refusal, .. } => match refusal {
            Refusal::Unsafe(_) | Refusal::TemplateInjection => {
                "That command may be unsafe, I won't run it".to_string()
            }
        },
        Outcome::AwaitingConfirmation { command, .. } => {
            format!("About to run \"{}\". Say \"confirm\" to continue or \"cancel\"", command)
        }
        Outcome::Declined { intent, cause } => {
            let label = intent_label(*intent, ReplyLanguage::En);
            match cause {
                DeclineCause::TimedOut => format!("No confirmation in time, cancelled {}", label),
                DeclineCause::Cancelled | DeclineCause::Declined => format!("OK, not going to {}", label),
                DeclineCause::Superseded => format!("Dropped the earlier {}", label),
            }
        }
        Outcome::Executed { result, .. } => executed_en(result),
        Outcome::DirectoryChanged { path } => format!("Done. Now in {}", path.display()),
        Outcome::DirectoryChangeFailed { path } => format!("Command failed: no directory {}", path.display()),
        Outcome::DryRun { command, .. } => format!("Dry run, not executing: {}", command),
    }
}

fn executed_zh(result: &ExecutionResult) -> String {
    if result.timed_out {
        return "指令執行失敗: 執行逾時".to_string();
    }
    if result.success {
        format!("指令執行成功。{}", spoken_output(&result.stdout))
    } else {
        let error = result
            .stderr_snippet()
            .map(str::to_string)
            .unwrap_or_else(|| format!("結束代碼 {}", result.exit_code));
        format!("指令執行失敗: {}", error)
    }
}

fn executed_en(result: &ExecutionResult) -> String {
    if result.timed_out {
        return "Command failed: timed out".to_string();
    }
    if result.success {
        format!("Done. {}", spoken_output(&result.stdout)).trim_end().to_string()
    } else {
        let error = result
            .stderr_snippet()
            .map(str::to_string)
            .unwrap_or_else(|| format!("exit code {}", result.exit_code));
        format!("Command failed: {}", error)
    }
}

fn spoken_output(stdout: &str) -> String {
    let trimmed = stdout.trim();
    if trimmed.chars().count() <= SPOKEN_OUTPUT_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(SPOKEN_OUTPUT_CHARS).collect();
        format!("{}…", head)
    }
}

fn slot_label_zh(slot: &str) -> &str {
    match slot {
        "name" => "名稱",
        "directory" => "目錄",
        "target" => "目標",
        "path" => "路徑",
        "source" => "來源",
        "destination" => "目的地",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use voxshell_core::{CommandLine, RejectionReason};

    fn executed(success: bool, stdout: &str, stderr: &str, exit_code: i32) -> Outcome {
        Outcome::Executed {
            intent: IntentId::ListFiles,
            command: CommandLine::new("ls", Vec::<String>::new()),
            result: ExecutionResult {
                success,
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                stdout_truncated: false,
                stderr_truncated: false,
                duration: Duration::from_millis(5),
                timed_out: false,
            },
        }
    }

    #[test]
    fn test_fixed_replies() {
        assert_eq!(render(&Outcome::Silence, ReplyLanguage::Zh), "我沒有聽清楚，請再說一次");
        assert_eq!(render(&Outcome::NotUnderstood, ReplyLanguage::Zh), "我不知道如何執行這個指令");
        let refused = Outcome::Refused {
            intent: IntentId::PurgeDirectory,
            refusal: Refusal::Unsafe(RejectionReason::DangerousPattern),
        };
        assert_eq!(render(&refused, ReplyLanguage::Zh), "這個指令可能不安全，我無法執行");
    }

    #[test]
    fn test_execution_replies() {
        assert_eq!(
            render(&executed(true, "a.txt\n", "", 0), ReplyLanguage::Zh),
            "指令執行成功。a.txt"
        );
        assert_eq!(
            render(&executed(false, "", "ls: cannot access 'x'\nmore", 2), ReplyLanguage::Zh),
            "指令執行失敗: ls: cannot access 'x'"
        );
        assert_eq!(render(&executed(false, "", "", 3), ReplyLanguage::En), "Command failed: exit code 3");
    }

    #[test]
    fn test_long_output_is_shortened() {
        let long = "x".repeat(500);
        let reply = render(&executed(true, &long, "", 0), ReplyLanguage::En);
        assert!(reply.ends_with('…'));
        assert!(reply.chars().count() < 220);
    }

    #[test]
    fn test_decline_causes() {
        let timed_out = Outcome::Declined {
            intent: IntentId::MoveFile,
            cause: DeclineCause::TimedOut,
        };
        assert_eq!(render(&timed_out, ReplyLanguage::Zh), "等待確認逾時，已取消移動檔案");

        let cancelled = Outcome::Declined {
            intent: IntentId::DeleteFile,
            cause: DeclineCause::Cancelled,
        };
        assert_eq!(render(&cancelled, ReplyLanguage::En), "OK, not going to delete file");
    }

    #[test]
    fn test_missing_slot_and_directory() {
        let missing = Outcome::MissingSlot {
            intent: IntentId::CreateFolder,
            slot: "name".to_string(),
        };
        assert_eq!(render(&missing, ReplyLanguage::Zh), "要建立資料夾，請告訴我名稱");

        let changed = Outcome::DirectoryChanged {
            path: PathBuf::from("/tmp/docs"),
        };
        assert!(render(&changed, ReplyLanguage::En).contains("/tmp/docs"));
    }
}
