use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::ReminderError;
use crate::models::Reminder;

/// 活动提醒与已完成提醒
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderBook {
    /// 按截止时间升序
    active: Vec<Reminder>,
    /// 最近完成的在前
    completed: Vec<Reminder>,
}

impl ReminderBook {
    pub fn new(mut active: Vec<Reminder>, completed: Vec<Reminder>) -> Self {
        active.sort_by_key(|r| r.due_at);
        Self { active, completed }
    }

    pub fn active(&self) -> &[Reminder] {
        &self.active
    }

    pub fn completed(&self) -> &[Reminder] {
        &self.completed
    }

    /// 添加提醒；标题去掉首尾空白后不能为空，标识符在两个集合中都必须唯一
    pub fn add(&mut self, reminder: Reminder) -> Result<&Reminder, ReminderError> {
        let title = reminder.title.trim();
        if title.is_empty() {
            return Err(ReminderError::EmptyTitle);
        }
        if self.contains(&reminder.identifier) {
            return Err(ReminderError::DuplicateIdentifier(reminder.identifier));
        }
        let reminder = Reminder {
            title: title.to_string(),
            ..reminder
        };
        let index = self.active.partition_point(|r| r.due_at <= reminder.due_at);
        info!(id = %reminder.identifier, due = %reminder.due_at, "reminder added");
        self.active.insert(index, reminder);
        Ok(&self.active[index])
    }

    /// 移到已完成集合
    pub fn complete(&mut self, identifier: &str) -> Result<Reminder, ReminderError> {
        let reminder = self.take_active(identifier)?;
        self.completed.insert(0, reminder.clone());
        info!(id = %identifier, "reminder completed");
        Ok(reminder)
    }

    /// 删除活动提醒，不进入已完成集合
    pub fn delete(&mut self, identifier: &str) -> Result<Reminder, ReminderError> {
        let reminder = self.take_active(identifier)?;
        info!(id = %identifier, "reminder deleted");
        Ok(reminder)
    }

    /// 清空已完成集合，返回清掉的数量
    pub fn clear_completed(&mut self) -> usize {
        let count = self.completed.len();
        self.completed.clear();
        debug!(count, "completed history cleared");
        count
    }

    pub fn overdue(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Reminder> {
        self.active.iter().filter(move |r| r.is_overdue(now))
    }

    pub fn overdue_count(&self, now: DateTime<Utc>) -> usize {
        self.overdue(now).count()
    }

    /// 按标识符前缀查找活动提醒
    pub fn find_active(&self, prefix: &str) -> Result<&Reminder, ReminderError> {
        find_by_prefix(&self.active, prefix)
    }

    /// 按标识符前缀查找已完成提醒
    pub fn find_completed(&self, prefix: &str) -> Result<&Reminder, ReminderError> {
        find_by_prefix(&self.completed, prefix)
    }

    fn contains(&self, identifier: &str) -> bool {
        self.active
            .iter()
            .chain(self.completed.iter())
            .any(|r| r.identifier == identifier)
    }

    fn take_active(&mut self, identifier: &str) -> Result<Reminder, ReminderError> {
        let index = self
            .active
            .iter()
            .position(|r| r.identifier == identifier)
            .ok_or_else(|| ReminderError::NotFound(identifier.to_string()))?;
        Ok(self.active.remove(index))
    }
}

/// 完全匹配优先，否则前缀必须唯一
fn find_by_prefix<'a>(items: &'a [Reminder], prefix: &str) -> Result<&'a Reminder, ReminderError> {
    if prefix.is_empty() {
        return Err(ReminderError::NotFound(String::new()));
    }
    if let Some(exact) = items.iter().find(|r| r.identifier == prefix) {
        return Ok(exact);
    }
    let mut matches = items.iter().filter(|r| r.identifier.starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(found), None) => Ok(found),
        (Some(_), Some(_)) => Err(ReminderError::Ambiguous(prefix.to_string())),
        (None, _) => Err(ReminderError::NotFound(prefix.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn active_stays_sorted_by_due_date() {
        let mut book = ReminderBook::default();
        book.add(Reminder::with_identifier("c", now() + Duration::hours(3), "c")).unwrap();
        book.add(Reminder::with_identifier("a", now() + Duration::hours(1), "a")).unwrap();
        book.add(Reminder::with_identifier("b", now() + Duration::hours(2), "b")).unwrap();
        let ids: Vec<_> = book.active().iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_blank_titles_and_duplicates() {
        let mut book = ReminderBook::default();
        assert_eq!(
            book.add(Reminder::with_identifier("   ", now(), "x")).unwrap_err(),
            ReminderError::EmptyTitle
        );
        book.add(Reminder::with_identifier(" Essay ", now(), "x")).unwrap();
        assert_eq!(book.active()[0].title, "Essay");
        book.complete("x").unwrap();
        assert_eq!(
            book.add(Reminder::with_identifier("Again", now(), "x")).unwrap_err(),
            ReminderError::DuplicateIdentifier("x".to_string())
        );
    }

    #[test]
    fn complete_moves_newest_first() {
        let mut book = ReminderBook::default();
        book.add(Reminder::with_identifier("a", now(), "a")).unwrap();
        book.add(Reminder::with_identifier("b", now(), "b")).unwrap();
        book.complete("a").unwrap();
        book.complete("b").unwrap();
        assert!(book.active().is_empty());
        assert_eq!(book.completed()[0].identifier, "b");
        assert!(matches!(book.complete("a"), Err(ReminderError::NotFound(_))));
    }

    #[test]
    fn delete_does_not_record_completion() {
        let mut book = ReminderBook::default();
        book.add(Reminder::with_identifier("a", now(), "a")).unwrap();
        book.delete("a").unwrap();
        assert!(book.active().is_empty());
        assert!(book.completed().is_empty());
    }

    #[test]
    fn prefix_lookup() {
        let mut book = ReminderBook::default();
        book.add(Reminder::with_identifier("one", now(), "ab12")).unwrap();
        book.add(Reminder::with_identifier("two", now(), "ab34")).unwrap();
        book.add(Reminder::with_identifier("three", now(), "ab")).unwrap();
        assert_eq!(book.find_active("ab1").unwrap().title, "one");
        assert_eq!(book.find_active("ab").unwrap().title, "three");
        assert!(matches!(book.find_active("a"), Err(ReminderError::Ambiguous(_))));
        assert!(matches!(book.find_active("zz"), Err(ReminderError::NotFound(_))));
    }

    #[test]
    fn overdue_includes_due_now() {
        let mut book = ReminderBook::default();
        book.add(Reminder::with_identifier("late", now() - Duration::minutes(1), "l")).unwrap();
        book.add(Reminder::with_identifier("now", now(), "n")).unwrap();
        book.add(Reminder::with_identifier("later", now() + Duration::minutes(1), "f")).unwrap();
        assert_eq!(book.overdue_count(now()), 2);
        assert_eq!(book.clear_completed(), 0);
    }
}
