//! Message keys and localized chat/banner templates.
//!
//! The event core only ever emits a [`Message`] (key plus positional
//! arguments); hosts render it for the recipient's language with
//! [`render`]. Unknown languages fall back to English.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKey {
    #[serde(rename = "cheatWarn1")]
    CheatWarning,
    #[serde(rename = "hunterKillBounty")]
    HunterKilledByBounty,
    #[serde(rename = "logAlreadyStarted")]
    AlreadyStarted,
    #[serde(rename = "notifySoonStart")]
    NotifySoonStart,
    #[serde(rename = "chatSoonStart")]
    ChatSoonStart,
    #[serde(rename = "notifyHunted")]
    NotifyHunted,
    #[serde(rename = "notifyStarted")]
    NotifyStarted,
    #[serde(rename = "chatStarted")]
    ChatStarted,
    #[serde(rename = "notifyHuntedUAV")]
    NotifyHuntedReveal,
    #[serde(rename = "notifyHunterUAV")]
    NotifyHunterReveal,
    #[serde(rename = "chatNextUAV")]
    ChatNextReveal,
    #[serde(rename = "chatOutsideForces")]
    ChatOutsideForces,
    #[serde(rename = "chatEventEnded")]
    ChatEventEnded,
    #[serde(rename = "notifyWinner")]
    NotifyWinner,
    #[serde(rename = "chatWinner")]
    ChatWinner,
    #[serde(rename = "chatAwarded")]
    ChatAwarded,
    #[serde(rename = "chatNoActiveEvent")]
    ChatNoActiveEvent,
    #[serde(rename = "chatYouJoined")]
    ChatYouJoined,
    #[serde(rename = "chatNewJoin")]
    ChatNewJoin,
    #[serde(rename = "needPerms")]
    NeedPermission,
    #[serde(rename = "chatNoHuntTeam")]
    ChatNoHuntTeam,
    #[serde(rename = "chatHuntedDisco")]
    ChatHuntedDisconnected,
    #[serde(rename = "chatCommandListHead")]
    CommandListHead,
    #[serde(rename = "commandListEntry")]
    CommandListEntry,
    #[serde(rename = "notEnoughPlayers")]
    NotEnoughPlayers,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub key: MessageKey,
    pub args: Vec<String>,
}

impl Message {
    pub fn new(key: MessageKey) -> Self {
        Self {
            key,
            args: Vec::new(),
        }
    }

    pub fn with_args<I, A>(key: MessageKey, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        Self {
            key,
            args: args.into_iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

pub const SUPPORTED_LANGUAGES: [&str; 5] = ["en", "es", "fr", "de", "ru"];

pub fn normalize_language(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw else {
        return "en";
    };
    let primary = raw
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    SUPPORTED_LANGUAGES
        .into_iter()
        .find(|lang| *lang == primary)
        .unwrap_or("en")
}

pub fn render(language: &str, message: &Message) -> String {
    let template = template(language, message.key)
        .or_else(|| template("en", message.key))
        .unwrap_or("{0}");
    substitute(template, &message.args)
}

/// Replaces `{n}` with the n-th argument; placeholders without an argument
/// are left verbatim.
fn substitute(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        match after[..close].parse::<usize>().ok().and_then(|i| args.get(i)) {
            Some(arg) => out.push_str(arg),
            None => out.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn template(language: &str, key: MessageKey) -> Option<&'static str> {
    use MessageKey::*;
    let text = match (language, key) {
        (_, CommandListEntry) => "{0}",

        ("en", CheatWarning) => "Possible cheat attempt by: {0} ran command with temp admin {1}",
        ("en", HunterKilledByBounty) => "A bounty target has killed the hunter {0}",
        ("en", AlreadyStarted) => "Event already in progress",
        ("en", NotifySoonStart) => "Manhunt is about to begin!",
        ("en", ChatSoonStart) => "Manhunt is about to begin! Join with: /manhunt join",
        ("en", NotifyHunted) => "You are being hunted!",
        ("en", NotifyStarted) => "Manhunt started!",
        ("en", ChatStarted) => "ManHunt event has started! Join with: /manhunt join",
        ("en", NotifyHuntedReveal) => "A UAV has revealed your location!",
        ("en", NotifyHunterReveal) => "A UAV has revealed the target!",
        ("en", ChatNextReveal) => "Next UAV fly over in {0} seconds.",
        ("en", ChatOutsideForces) => "Outside forces killed bounty.",
        ("en", ChatEventEnded) => "ManHunt event has ended!",
        ("en", NotifyWinner) => "{0} has won the Manhunt!",
        ("en", ChatWinner) => "{0} has won the Manhunt!",
        ("en", ChatAwarded) => "{0} has been awarded {1} RP!",
        ("en", ChatNoActiveEvent) => "There is no active Manhunt event.",
        ("en", ChatYouJoined) => "You have joined the hunt!",
        ("en", ChatNewJoin) => "{0} has joined the hunt!",
        ("en", NeedPermission) => "Insufficient permissions.",
        ("en", ChatNoHuntTeam) => "You can not hunt your team members.",
        ("en", ChatHuntedDisconnected) => "Hunted disconnected.",
        ("en", CommandListHead) => "ManHunt Commands:",
        ("en", NotEnoughPlayers) => "Not enough players for Manhunt ({0} of {1}).",

        ("es", CheatWarning) => "Posible intento de trampa por parte de: {0} ejecutó el comando con el administrador temporal {1}",
        ("es", HunterKilledByBounty) => "Un objetivo de recompensa ha matado al cazador {0}",
        ("es", AlreadyStarted) => "Evento ya en progreso",
        ("es", NotifySoonStart) => "La caza humana está a punto de comenzar!",
        ("es", ChatSoonStart) => "¡ManHunt está a punto de comenzar! Unirse con: /manhunt join",
        ("es", NotifyHunted) => "estas siendo cazado!",
        ("es", NotifyStarted) => "La caza humana comenzó!",
        ("es", ChatStarted) => "¡El evento ManHunt ha comenzado! Unirse con: /manhunt join",
        ("es", NotifyHuntedReveal) => "Un UAV ha revelado tu ubicación!",
        ("es", NotifyHunterReveal) => "Un UAV ha revelado el objetivo.",
        ("es", ChatNextReveal) => "El próximo UAV sobrevuela en {0} segundos.",
        ("es", ChatOutsideForces) => "Fuerzas externas mataron al objetivo.",
        ("es", ChatEventEnded) => "El evento ManHunt ha finalizado!",
        ("es", NotifyWinner) => "{0} ha ganado el evento!",
        ("es", ChatWinner) => "{0} ha ganado el evento!",
        ("es", ChatAwarded) => "{0} ha recibido {1} RP!",
        ("es", ChatNoActiveEvent) => "No hay ningún evento activo.",
        ("es", ChatYouJoined) => "Te has unido a la caza!",
        ("es", ChatNewJoin) => "{0} se ha unido a la caza!",
        ("es", NeedPermission) => "Permisos insuficientes.",
        ("es", ChatNoHuntTeam) => "No puedes cazar a los miembros de tu equipo.",
        ("es", ChatHuntedDisconnected) => "Objetivo desconectado.",
        ("es", CommandListHead) => "comandos de chat de caza humana:",

        ("fr", CheatWarning) => "Possible tentative de triche de la part de: {0} exécuté la commande avec l'administrateur temporaire {1}",
        ("fr", HunterKilledByBounty) => "Une cible de prime a tué le chasseur {0}",
        ("fr", AlreadyStarted) => "Événement déjà en cours",
        ("fr", NotifySoonStart) => "La chasse à l'homme est sur le point de commencer!",
        ("fr", ChatSoonStart) => "ManHunt est sur le point de commencer ! Rejoignez-nous avec: /manhunt join",
        ("fr", NotifyHunted) => "Tu es traqué!",
        ("fr", NotifyStarted) => "La chasse à l'homme a commencé!",
        ("fr", ChatStarted) => "L'événement ManHunt a commencé! Rejoignez-nous avec: /manhunt join",
        ("fr", NotifyHuntedReveal) => "Un drone a révélé votre position!",
        ("fr", NotifyHunterReveal) => "Un drone a révélé la cible!",
        ("fr", ChatNextReveal) => "Le prochain drone survolera dans {0} secondes.",
        ("fr", ChatOutsideForces) => "Les forces extérieures ont tué la cible.",
        ("fr", ChatEventEnded) => "l'événement est terminé!",
        ("fr", NotifyWinner) => "{0} a gagné la prime!",
        ("fr", ChatWinner) => "{0} a gagné la prime!",
        ("fr", ChatAwarded) => "{0} a reçu {1} RP!",
        ("fr", ChatNoActiveEvent) => "Il n'y a aucun événement actif.",
        ("fr", ChatYouJoined) => "Vous avez rejoint la chasse!",
        ("fr", ChatNewJoin) => "{0} a rejoint la chasse!",
        ("fr", ChatNoHuntTeam) => "Vous ne pouvez pas chasser les membres de votre équipe.",
        ("fr", ChatHuntedDisconnected) => "Cible déconnectée.",
        ("fr", CommandListHead) => "commandes de chat de chasse à l'homme:",

        ("de", CheatWarning) => "Möglicher Cheat-Versuch von: {0} hat den Befehl mit dem temporären Administrator {1} ausgeführt.",
        ("de", HunterKilledByBounty) => "Ein Kopfgeldziel hat den Jäger {0} getötet",
        ("de", AlreadyStarted) => "Veranstaltung bereits im Gange",
        ("de", NotifySoonStart) => "Die Fahndung beginnt gleich!",
        ("de", NotifyHunted) => "Du wirst gejagt!",
        ("de", NotifyStarted) => "Die Fahndung hat begonnen!",
        ("de", NotifyHuntedReveal) => "Ein UAV hat Ihren Standort ermittelt!",
        ("de", NotifyHunterReveal) => "Ein UAV hat das Ziel entdeckt!",
        ("de", ChatNextReveal) => "Nächster UAV-Flug in {0} Sekunden.",
        ("de", ChatOutsideForces) => "Externe Kräfte töteten Kopfgeld.",
        ("de", ChatEventEnded) => "Die Fahndungsveranstaltung ist beendet!",
        ("de", NotifyWinner) => "{0} hat die Fahndung gewonnen!",
        ("de", ChatWinner) => "{0} hat die Fahndung gewonnen!",
        ("de", ChatAwarded) => "{0} hat {1} RP erhalten!",
        ("de", ChatNoActiveEvent) => "Es gibt kein aktives Ereignis.",
        ("de", ChatYouJoined) => "Sie haben sich der Jagd angeschlossen!",
        ("de", ChatNewJoin) => "{0} hat sich der Jagd angeschlossen!",
        ("de", NeedPermission) => "Nicht ausreichende Berechtigungen.",
        ("de", ChatNoHuntTeam) => "Sie können Ihre Teammitglieder nicht jagen.",
        ("de", ChatHuntedDisconnected) => "Zielverbindung getrennt.",
        ("de", CommandListHead) => "Fahndungs-Chat-Befehle:",

        ("ru", HunterKilledByBounty) => "Цель награды убила охотника {0}",
        ("ru", AlreadyStarted) => "Мероприятие уже в процессе",
        ("ru", NotifySoonStart) => "Охота вот-вот начнется!",
        ("ru", NotifyHunted) => "На вас охотятся!",
        ("ru", NotifyStarted) => "Охота началась!",
        ("ru", ChatStarted) => "Охота на людей началась! Присоединяйтесь к: /manhunt join",
        ("ru", NotifyHuntedReveal) => "БПЛА раскрыл ваше местоположение!",
        ("ru", NotifyHunterReveal) => "БПЛА обнаружил цель!",
        ("ru", ChatNextReveal) => "Следующий БПЛА пролетит через {0} секунд.",
        ("ru", ChatOutsideForces) => "Внешние силы убили цель.",
        ("ru", ChatEventEnded) => "Мероприятие завершилось!",
        ("ru", NotifyWinner) => "{0} выиграл охоту!",
        ("ru", ChatWinner) => "{0} выиграл охоту!",
        ("ru", ChatAwarded) => "Пользователь {0} получил {1} RP!",
        ("ru", ChatNoActiveEvent) => "Активного события нет.",
        ("ru", ChatYouJoined) => "Вы присоединились к охоте!",
        ("ru", ChatNewJoin) => "{0} присоединился к охоте!",
        ("ru", NeedPermission) => "Недостаточно разрешений.",
        ("ru", ChatNoHuntTeam) => "Вы не можете охотиться на членов своей команды.",
        ("ru", ChatHuntedDisconnected) => "Цель отключена.",
        ("ru", CommandListHead) => "команды чата для розыска:",

        _ => return None,
    };
    Some(text)
}
