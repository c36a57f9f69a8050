use crate::models::{Priority, Task, TaskStatus};

/// Status tab of the task list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusTab {
  #[default]
  All,
  Only(TaskStatus),
}

impl StatusTab {
  pub fn all_variants() -> [StatusTab; 4] {
    [
      StatusTab::All,
      StatusTab::Only(TaskStatus::Todo),
      StatusTab::Only(TaskStatus::InProgress),
      StatusTab::Only(TaskStatus::Completed),
    ]
  }

  pub fn label(&self) -> &'static str {
    match self {
      StatusTab::All => "All",
      StatusTab::Only(status) => status.label(),
    }
  }

  fn admits(&self, status: TaskStatus) -> bool {
    match self {
      StatusTab::All => true,
      StatusTab::Only(wanted) => *wanted == status,
    }
  }
}

/// Search text plus status tab, applied over the cached order.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
  pub search: String,
  pub tab: StatusTab,
}

impl TaskFilter {
  pub fn matches(&self, task: &Task) -> bool {
    self.tab.admits(task.status) && self.matches_search(task)
  }

  fn matches_search(&self, task: &Task) -> bool {
    let needle = self.search.trim().to_lowercase();
    if needle.is_empty() {
      return true;
    }

    task.title.to_lowercase().contains(&needle)
      || task
        .description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains(&needle))
  }

  /// Matching tasks, keeping cache order.
  pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
    tasks.iter().filter(|t| self.matches(t)).collect()
  }
}

/// Counters shown above the task list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
  pub total: usize,
  pub completed: usize,
  pub in_progress: usize,
  pub high_priority: usize,
}

impl TaskStats {
  pub fn from_tasks(tasks: &[Task]) -> Self {
    tasks.iter().fold(Self::default(), |mut stats, task| {
      stats.total += 1;
      match task.status {
        TaskStatus::Completed => stats.completed += 1,
        TaskStatus::InProgress => stats.in_progress += 1,
        TaskStatus::Todo => {}
      }
      match task.priority {
        Priority::High => stats.high_priority += 1,
        Priority::Medium | Priority::Low => {}
      }
      stats
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::{EntityId, PrincipalId};
  use chrono::Utc;

  fn task(title: &str, description: Option<&str>, status: TaskStatus, priority: Priority) -> Task {
    Task {
      id: EntityId::new(title),
      owner_id: PrincipalId::new("u-1"),
      title: title.to_string(),
      description: description.map(String::from),
      priority,
      status,
      due_date: None,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  fn test_tasks() -> Vec<Task> {
    vec![
      task("Buy milk", None, TaskStatus::Todo, Priority::Low),
      task(
        "Reply to Grace",
        Some("About the Milk order"),
        TaskStatus::InProgress,
        Priority::High,
      ),
      task("File taxes", None, TaskStatus::Completed, Priority::High),
    ]
  }

  #[test]
  fn test_empty_filter_keeps_everything_in_order() {
    let tasks = test_tasks();
    let titles: Vec<_> = TaskFilter::default()
      .apply(&tasks)
      .iter()
      .map(|t| t.title.as_str())
      .collect();
    assert_eq!(titles, vec!["Buy milk", "Reply to Grace", "File taxes"]);
  }

  #[test]
  fn test_search_covers_title_and_description() {
    let tasks = test_tasks();
    let filter = TaskFilter {
      search: "MILK".to_string(),
      tab: StatusTab::All,
    };
    assert_eq!(filter.apply(&tasks).len(), 2);
  }

  #[test]
  fn test_search_combined_with_tab() {
    let tasks = test_tasks();
    let filter = TaskFilter {
      search: "milk".to_string(),
      tab: StatusTab::Only(TaskStatus::InProgress),
    };
    let filtered = filter.apply(&tasks);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].title, "Reply to Grace");
  }

  #[test]
  fn test_stats() {
    let stats = TaskStats::from_tasks(&test_tasks());
    assert_eq!(
      stats,
      TaskStats {
        total: 3,
        completed: 1,
        in_progress: 1,
        high_priority: 2,
      }
    );
  }

  #[test]
  fn test_tab_labels() {
    let labels: Vec<_> = StatusTab::all_variants().iter().map(|t| t.label()).collect();
    assert_eq!(labels, vec!["All", "To Do", "In Progress", "Completed"]);
  }
}
