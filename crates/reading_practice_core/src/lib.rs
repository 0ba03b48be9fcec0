pub mod domain;
pub mod policy;
pub mod ports;
pub mod progress;

pub use domain::{
    Difficulty, Favorite, FavoritePoem, Level, Mistake, MistakeKind, NewPoem, NewReading, NewUser,
    Page, PageRequest, Poem, PoemFilter, PoemUpdate, Progress, Reading, ReadingFilter,
    ReadingUpdate, Role, SessionData, Severity, StudentFilter, TimeRange, User, UserCredentials,
    UserUpdate,
};
pub use policy::AccessError;
pub use ports::{DatabaseService, PortError, PortResult};
pub use progress::{WeekWindow, WeeklyStats};
