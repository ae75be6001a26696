//! Academic planning stages (syllabus, course schedule)

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::contract::{Stage, StageContext};
use crate::failure::StageError;
use crate::stages::required_str;

/// Weeks a syllabus spans when the request does not say.
const DEFAULT_DURATION_WEEKS: u64 = 16;

/// Teaching days available to the schedule solver.
const TEACHING_DAYS: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

/// Class sessions per course per week when the request does not say.
const DEFAULT_SESSIONS_PER_WEEK: u64 = 2;

/// Spreads the learning objectives across the semester weeks.
pub struct CurriculumOutlineStage;

#[async_trait]
impl Stage for CurriculumOutlineStage {
    fn name(&self) -> &'static str {
        "curriculum_outline"
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let objectives: Vec<String> = ctx
            .request
            .get("learning_objectives")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::domain("missing required field `learning_objectives`"))?
            .iter()
            .map(|o| o.as_str().map(str::to_string).unwrap_or_else(|| o.to_string()))
            .collect();
        if objectives.is_empty() {
            return Err(StageError::domain("learning_objectives must not be empty"));
        }

        let duration_weeks = ctx
            .request
            .get("duration_weeks")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_DURATION_WEEKS)
            .clamp(1, 52);
        let student_level = ctx
            .request
            .get("student_level")
            .and_then(Value::as_str)
            .unwrap_or("intermediate");

        let weeks: Vec<Value> = (1..=duration_weeks)
            .map(|week| {
                let focus = &objectives[((week - 1) as usize) % objectives.len()];
                json!({
                    "week": week,
                    "focus": focus,
                    "activities": [
                        format!("lecture: {focus}"),
                        format!("practice set ({student_level} level)"),
                    ],
                })
            })
            .collect();

        let milestones = json!([
            {"week": (duration_weeks / 2).max(1), "milestone": "midterm review"},
            {"week": duration_weeks, "milestone": "capstone synthesis"},
        ]);

        Ok(json!({
            "duration_weeks": duration_weeks,
            "student_level": student_level,
            "weeks": weeks,
            "milestones": milestones,
        }))
    }
}

/// Assembles the outline into the final structured syllabus.
pub struct ComposeSyllabusStage;

#[async_trait]
impl Stage for ComposeSyllabusStage {
    fn name(&self) -> &'static str {
        "compose_syllabus"
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let outline = ctx
            .output_of("curriculum_outline")
            .ok_or_else(|| StageError::domain("curriculum_outline output missing"))?;
        let course_info = ctx
            .request
            .get("course_info")
            .cloned()
            .ok_or_else(|| StageError::domain("missing required field `course_info`"))?;
        let title = course_info
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled Course")
            .to_string();

        let assessment_plan = json!({
            "formative": ["weekly practice sets", "in-class checkpoints"],
            "summative": ["midterm project", "final capstone"],
            "grading_breakdown": {
                "participation": 10,
                "assignments": 40,
                "midterm": 20,
                "final": 30,
            },
        });
        let resources = json!({
            "primary_texts": [format!("{title}: course reader")],
            "online_materials": [format!("curated media library for {title}")],
            "study_guides": ["weekly recap sheets"],
        });

        info!(session = %ctx.session_id, course = %title, "syllabus composed");
        Ok(json!({
            "syllabus": {
                "course": course_info,
                "duration_weeks": outline.get("duration_weeks").cloned().unwrap_or(json!(DEFAULT_DURATION_WEEKS)),
                "weekly_breakdown": outline.get("weeks").cloned().unwrap_or(json!([])),
                "milestones": outline.get("milestones").cloned().unwrap_or(json!([])),
                "assessment_plan": assessment_plan,
                "resources": resources,
            }
        }))
    }
}

/// One assigned weekly class slot.
fn slot(course: &str, day: &str, start_hour: u64, duration_minutes: u64) -> Value {
    let end_minutes = start_hour * 60 + duration_minutes;
    json!({
        "course": course,
        "day": day,
        "start": format!("{start_hour:02}:00"),
        "end": format!("{:02}:{:02}", end_minutes / 60, end_minutes % 60),
    })
}

/// Assigns conflict-free weekly time slots for every course.
pub struct SolveScheduleStage;

#[async_trait]
impl Stage for SolveScheduleStage {
    fn name(&self) -> &'static str {
        "solve_schedule"
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let courses = ctx
            .request
            .get("courses")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::domain("missing required field `courses`"))?;
        if courses.is_empty() {
            return Err(StageError::domain("courses must not be empty"));
        }

        let unavailable: Vec<&str> = ctx
            .request
            .get("constraints")
            .and_then(|c| c.get("unavailable_days"))
            .and_then(Value::as_array)
            .map(|days| days.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let days: Vec<&str> = TEACHING_DAYS
            .iter()
            .copied()
            .filter(|d| !unavailable.contains(d))
            .collect();
        if days.is_empty() {
            return Err(StageError::domain(
                "constraints leave no teaching day available",
            ));
        }

        // Earliest class hour tracks the declared energy pattern.
        let base_hour = match ctx
            .request
            .get("preferences")
            .and_then(|p| p.get("energy_pattern"))
            .and_then(Value::as_str)
        {
            Some("morning") => 9,
            Some("evening") => 15,
            _ => 11,
        };

        let mut slots = Vec::new();
        let mut cursor = 0usize;
        for course in courses {
            let name = required_str(course, "name")?;
            let per_week = course
                .get("sessions_per_week")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_SESSIONS_PER_WEEK)
                .clamp(1, days.len() as u64);
            let duration_minutes = course
                .get("duration_minutes")
                .and_then(Value::as_u64)
                .unwrap_or(60);

            for _ in 0..per_week {
                let day = days[cursor % days.len()];
                let hour = base_hour + (cursor / days.len()) as u64;
                slots.push(slot(name, day, hour, duration_minutes));
                cursor += 1;
            }
        }

        Ok(json!({
            "slots": slots,
            "semester_start": ctx.request.get("semester_start").cloned().unwrap_or(Value::Null),
            "semester_end": ctx.request.get("semester_end").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// Scores the solved schedule and attaches recommendations.
pub struct OptimizeScheduleStage;

#[async_trait]
impl Stage for OptimizeScheduleStage {
    fn name(&self) -> &'static str {
        "optimize_schedule"
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let solved = ctx
            .output_of("solve_schedule")
            .ok_or_else(|| StageError::domain("solve_schedule output missing"))?;
        let slots = solved
            .get("slots")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::domain("solve_schedule produced no slots"))?;

        let mut per_day: Map<String, Value> = Map::new();
        for day in TEACHING_DAYS {
            let count = slots
                .iter()
                .filter(|s| s.get("day").and_then(Value::as_str) == Some(day))
                .count();
            per_day.insert(day.to_string(), json!(count));
        }

        // Crowded days cost points; an even spread scores high.
        let busiest = per_day
            .values()
            .filter_map(Value::as_u64)
            .max()
            .unwrap_or(0);
        let optimization_score = 100u64.saturating_sub(busiest.saturating_sub(3) * 10);

        let mut recommendations = vec![
            "Keep a free hour between consecutive classes for review".to_string(),
            "Schedule demanding courses inside your declared energy window".to_string(),
        ];
        if busiest > 3 {
            let (day, _) = per_day
                .iter()
                .max_by_key(|(_, v)| v.as_u64().unwrap_or(0))
                .expect("per_day is non-empty");
            recommendations.push(format!("{day} is crowded; consider moving one session"));
        }

        info!(session = %ctx.session_id, score = optimization_score, "schedule optimized");
        Ok(json!({
            "schedule": {
                "slots": slots,
                "load_by_day": per_day,
                "optimization_score": optimization_score,
                "recommendations": recommendations,
                "semester_start": solved.get("semester_start").cloned().unwrap_or(Value::Null),
                "semester_end": solved.get("semester_end").cloned().unwrap_or(Value::Null),
            }
        }))
    }
}
